use std::cell::RefCell;
use std::io::Write;
use std::rc::Rc;

use seesv::{DelimitedFile, DelimitedFileBuilder, Error};
use tempfile::NamedTempFile;

const HEADER: &str = "ID,FIRST_NAME,LAST_NAME,EMAIL,GENDER,IP_ADDRESS,CITY,COUNTRY";

fn people_rows(rows: usize) -> String {
    let mut data = String::new();
    for i in 1..=rows {
        let first = if i == 1 {
            "Vern"
        } else if i == rows {
            "LastRow"
        } else {
            ["Mickie", "Wolfie", "Jeremy", "Phillida"][i % 4]
        };
        data.push_str(&format!(
            "{},{},Harms,{}{}@example.com,M,10.1.{}.{},Oslo,NO\n",
            i,
            first,
            first.to_lowercase(),
            i,
            i / 256,
            i % 256,
        ));
    }
    data
}

fn people_csv(rows: usize) -> String {
    format!("{}\n{}", HEADER, people_rows(rows))
}

fn tmp(contents: &str) -> NamedTempFile {
    let mut f = NamedTempFile::new().unwrap();
    f.write_all(contents.as_bytes()).unwrap();
    f.flush().unwrap();
    f
}

#[test]
fn load_file() {
    let f = tmp(&people_csv(1000));
    let csv = DelimitedFile::from_path(f.path()).unwrap();
    assert!(csv.has_header());
    assert_eq!(csv.header()[0], "ID");
    assert_eq!(csv.row_count(), 1000);
    assert_eq!(csv.columns().len(), 8);
    assert_eq!(csv.columns().position("FIRST_NAME"), Some(1));
    assert_eq!(csv.columns().position("COUNTRY"), Some(7));
    assert_eq!(csv.columns().position("NO_SUCH_COLUMN"), None);

    // The first row starts right after the header line.
    let index = csv.index().unwrap();
    assert_eq!(index.len(), 1000);
    assert_eq!(index.get(0), Some(HEADER.len() as u64 + 1));
}

#[test]
fn open_is_explicit_and_close_resets() {
    let f = tmp(&people_csv(100));
    let mut csv = DelimitedFile::new(f.path());
    assert!(!csv.is_open());
    assert!(csv.header().is_empty());
    assert!(csv.columns().is_empty());
    assert_eq!(csv.row_count(), 0);
    assert!(matches!(csv.get_row(0), Err(Error::NotOpen)));
    assert!(matches!(csv.get_rows(0, None).err(), Some(Error::NotOpen)));

    csv.open().unwrap();
    assert!(csv.is_open());
    assert_eq!(csv.row_count(), 100);
    assert_eq!(csv.columns().len(), 8);

    csv.close();
    assert!(!csv.is_open());
    assert_eq!(csv.row_count(), 0);
    assert!(csv.header().is_empty());
    assert!(csv.columns().is_empty());
    assert!(matches!(csv.get_row(0), Err(Error::NotOpen)));
}

#[test]
fn reopen_rebuilds_an_identical_index() {
    let f = tmp(&people_csv(250));
    let mut csv = DelimitedFile::from_path(f.path()).unwrap();
    let header = csv.header().to_vec();
    let row_count = csv.row_count();
    let first_offset = csv.index().unwrap().get(0);

    csv.close();
    csv.open().unwrap();
    assert_eq!(csv.header(), &header[..]);
    assert_eq!(csv.row_count(), row_count);
    assert_eq!(csv.index().unwrap().get(0), first_offset);
}

#[test]
fn unskipped_junk_line_becomes_the_header() {
    let data = format!("SKIP THIS LINE,x,x,x,x,x,x,x\n{}", people_csv(100));
    let f = tmp(&data);
    let csv = DelimitedFile::from_path(f.path()).unwrap();
    assert_eq!(csv.header()[0], "SKIP THIS LINE");
    // The real header is then indexed as the first data row.
    assert_eq!(csv.row_count(), 101);
}

#[test]
fn skip_lines_reveals_the_real_header() {
    let data = format!("SKIP THIS LINE,x,x,x,x,x,x,x\n{}", people_csv(100));
    let f = tmp(&data);
    let mut csv = DelimitedFileBuilder::new()
        .skip_lines(1)
        .from_path(f.path())
        .unwrap();
    assert_eq!(csv.header()[0], "ID");
    assert_eq!(csv.header()[1], "FIRST_NAME");
    assert_eq!(csv.row_count(), 100);

    let row = csv.get_row(0).unwrap();
    assert_eq!(row[0], "1");
    assert_eq!(row[1], "Vern");
}

#[test]
fn no_header() {
    let f = tmp(&people_rows(100));
    let mut csv = DelimitedFileBuilder::new()
        .has_header(false)
        .from_path(f.path())
        .unwrap();
    assert!(csv.header().is_empty());
    assert!(csv.columns().is_empty());
    assert_eq!(csv.row_count(), 100);
    assert_eq!(csv.get_row(0).unwrap()[0], "1");
}

#[test]
fn get_one_row() {
    let f = tmp(&people_csv(1000));
    let mut csv = DelimitedFile::from_path(f.path()).unwrap();

    let row = csv.get_row(0).unwrap();
    assert_eq!(row.len(), 8);
    assert_eq!(row[0], "1");
    assert_eq!(row[1], "Vern");

    let last = csv.get_row(csv.row_count() - 1).unwrap();
    assert_eq!(last[0], "1000");
    assert_eq!(last[1], "LastRow");

    // Random access does not depend on call order.
    assert_eq!(csv.get_row(0).unwrap()[1], "Vern");
}

#[test]
fn get_rows_bounded() {
    let f = tmp(&people_csv(1000));
    let mut csv = DelimitedFile::from_path(f.path()).unwrap();

    let rows: Vec<_> = csv
        .get_rows(499, Some(200))
        .unwrap()
        .collect::<Result<_, _>>()
        .unwrap();
    assert_eq!(rows.len(), 200);
    assert_eq!(rows[0][0], "500");
    assert_eq!(rows[199][0], "699");

    let rows = csv.get_rows_as_list(499, Some(200)).unwrap();
    assert_eq!(rows.len(), 200);
    assert_eq!(rows[0][0], "500");
}

#[test]
fn get_rows_to_end() {
    let f = tmp(&people_csv(1000));
    let mut csv = DelimitedFile::from_path(f.path()).unwrap();

    let rows = csv.get_rows_as_list(csv.row_count() - 10, None).unwrap();
    assert_eq!(rows.len(), 10);

    let rows = csv.get_rows_as_list(csv.row_count() - 200, None).unwrap();
    assert_eq!(rows.len(), 200);
    assert_eq!(rows[199][1], "LastRow");

    // A count past the end of the file stops at the end of the file.
    let rows = csv.get_rows_as_list(990, Some(9999)).unwrap();
    assert_eq!(rows.len(), 10);
}

#[test]
fn row_numbers_out_of_bounds() {
    let f = tmp(&people_csv(1000));
    let mut csv = DelimitedFile::from_path(f.path()).unwrap();

    match csv.get_row(1000) {
        Err(Error::Index { row, row_count }) => {
            assert_eq!(row, 1000);
            assert_eq!(row_count, 1000);
        }
        other => panic!("expected index error, got {:?}", other),
    }
    assert!(matches!(
        csv.get_rows(1000, None).err(),
        Some(Error::Index { .. })
    ));
    assert!(matches!(
        csv.get_rows(u64::max_value(), Some(1)).err(),
        Some(Error::Index { .. })
    ));

    // A failed access leaves the handle usable.
    assert_eq!(csv.get_row(999).unwrap()[1], "LastRow");
}

#[test]
fn both_access_paths_agree() {
    let f = tmp(&people_csv(1000));
    let mut csv = DelimitedFile::from_path(f.path()).unwrap();
    for &n in &[0, 1, 499, 998, 999] {
        let direct = csv.get_row(n).unwrap();
        let streamed = csv.get_rows_as_list(n, Some(1)).unwrap();
        assert_eq!(streamed.len(), 1);
        assert_eq!(direct, streamed[0], "row {}", n);
    }
}

#[test]
fn quoted_fields_do_not_break_rows() {
    let data = "ID,NOTE\n\
                1,\"hello, world\"\n\
                2,\"line one\nline two\"\n\
                3,\"say \"\"hi\"\"\"\n\
                4,plain\n";
    let f = tmp(data);
    let mut csv = DelimitedFile::from_path(f.path()).unwrap();
    assert_eq!(csv.row_count(), 4);

    assert_eq!(csv.get_row(0).unwrap(), vec!["1", "hello, world"]);
    assert_eq!(csv.get_row(1).unwrap(), vec!["2", "line one\nline two"]);
    assert_eq!(csv.get_row(2).unwrap(), vec!["3", "say \"hi\""]);
    assert_eq!(csv.get_row(3).unwrap(), vec!["4", "plain"]);

    // Seeking into the middle works even when earlier rows span physical
    // lines.
    assert_eq!(csv.get_row(2).unwrap()[0], "3");

    let all = csv.get_rows_as_list(0, None).unwrap();
    assert_eq!(all.len(), 4);
    assert_eq!(all[1], csv.get_row(1).unwrap());
}

#[test]
fn custom_delimiter_and_quote() {
    let data = "ID;NOTE\n1;'a;b'\n2;c\n";
    let f = tmp(data);
    let mut csv = DelimitedFileBuilder::new()
        .delimiter(b';')
        .quote(b'\'')
        .from_path(f.path())
        .unwrap();
    assert_eq!(csv.header(), ["ID", "NOTE"]);
    assert_eq!(csv.row_count(), 2);
    assert_eq!(csv.get_row(0).unwrap(), vec!["1", "a;b"]);
    assert_eq!(csv.get_row(1).unwrap(), vec!["2", "c"]);
}

#[test]
fn unterminated_quote_is_reported_and_indexed_best_effort() {
    let errors = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&errors);

    let data = "ID,NOTE\n1,\"good\"\n2,\"oops\n3,more\n";
    let f = tmp(data);
    let mut csv = DelimitedFileBuilder::new()
        .error_sink(move |msg: &str| sink.borrow_mut().push(msg.to_string()))
        .from_path(f.path())
        .unwrap();

    // The unterminated quote swallows the rest of the file into one
    // best-effort row; the scan still completes.
    assert_eq!(csv.row_count(), 2);
    assert_eq!(csv.get_row(0).unwrap(), vec!["1", "good"]);
    let bad = csv.get_row(1).unwrap();
    assert_eq!(bad[0], "2");
    assert_eq!(bad[1], "oops\n3,more\n");

    let errors = errors.borrow();
    assert_eq!(errors.len(), 1);
    assert!(errors[0].contains("unterminated quoted field"));
    assert!(errors[0].contains("row 1"));
}

#[test]
fn progress_is_reported_and_monotonic() {
    let reports = Rc::new(RefCell::new(Vec::new()));
    let sink = Rc::clone(&reports);

    let f = tmp(&people_csv(55));
    let csv = DelimitedFileBuilder::new()
        .progress_interval(10)
        .progress_sink(move |pct: u8| sink.borrow_mut().push(pct))
        .from_path(f.path())
        .unwrap();
    assert_eq!(csv.row_count(), 55);

    let reports = reports.borrow();
    // One report per ten rows, plus the final report.
    assert_eq!(reports.len(), 6);
    assert_eq!(*reports.last().unwrap(), 100);
    for pair in reports.windows(2) {
        assert!(pair[0] <= pair[1], "progress went backwards: {:?}", reports);
    }
}

#[test]
fn header_only_file_has_no_rows() {
    let f = tmp("ID,NAME\n");
    let mut csv = DelimitedFile::from_path(f.path()).unwrap();
    assert_eq!(csv.header(), ["ID", "NAME"]);
    assert_eq!(csv.row_count(), 0);

    // Streaming from row zero of an empty index yields nothing rather
    // than failing.
    assert!(csv.get_rows_as_list(0, None).unwrap().is_empty());
    assert!(matches!(csv.get_row(0), Err(Error::Index { .. })));
    assert!(matches!(
        csv.get_rows(1, None).err(),
        Some(Error::Index { .. })
    ));
}

#[test]
fn empty_file() {
    let f = tmp("");
    let mut csv = DelimitedFile::from_path(f.path()).unwrap();
    assert!(csv.header().is_empty());
    assert_eq!(csv.row_count(), 0);
    assert!(csv.get_rows_as_list(0, None).unwrap().is_empty());
}

#[test]
fn skip_lines_past_end_of_file() {
    let f = tmp("only,one,line\n");
    let csv = DelimitedFileBuilder::new()
        .skip_lines(10)
        .from_path(f.path())
        .unwrap();
    assert!(csv.header().is_empty());
    assert_eq!(csv.row_count(), 0);
}

#[test]
fn blank_lines_are_rows() {
    let f = tmp("A,B\n1,x\n\n2,y\n");
    let mut csv = DelimitedFile::from_path(f.path()).unwrap();
    assert_eq!(csv.row_count(), 3);
    assert_eq!(csv.get_row(0).unwrap(), vec!["1", "x"]);
    assert_eq!(csv.get_row(1).unwrap(), vec![""]);
    assert_eq!(csv.get_row(2).unwrap(), vec!["2", "y"]);
}

#[test]
fn crlf_terminators() {
    let f = tmp("ID,NAME\r\n1,Vern\r\n2,Bob\r\n");
    let mut csv = DelimitedFile::from_path(f.path()).unwrap();
    assert_eq!(csv.header(), ["ID", "NAME"]);
    assert_eq!(csv.row_count(), 2);
    assert_eq!(csv.get_row(0).unwrap(), vec!["1", "Vern"]);
    assert_eq!(csv.get_row(1).unwrap(), vec!["2", "Bob"]);
}

#[test]
fn missing_final_newline() {
    let f = tmp("A\n1\n2");
    let mut csv = DelimitedFile::from_path(f.path()).unwrap();
    assert_eq!(csv.row_count(), 2);
    assert_eq!(csv.get_row(1).unwrap(), vec!["2"]);
}

#[test]
fn missing_file_fails_to_open() {
    let err = DelimitedFile::from_path("/no/such/file.csv").err().unwrap();
    assert!(matches!(err, Error::Io(_)));

    // A failed open leaves the handle closed and empty.
    let mut csv = DelimitedFile::new("/no/such/file.csv");
    assert!(csv.open().is_err());
    assert!(!csv.is_open());
    assert!(csv.header().is_empty());
    assert_eq!(csv.row_count(), 0);
}

#[test]
fn rows_are_independent_of_the_handle() {
    let f = tmp(&people_csv(10));
    let row = {
        let mut csv = DelimitedFile::from_path(f.path()).unwrap();
        csv.get_row(3).unwrap()
        // Handle dropped (and the file closed) here.
    };
    assert_eq!(row[0], "4");
}
