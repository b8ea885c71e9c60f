use arrow::array::{
    Array, BinaryArray, BooleanArray, Decimal128Array, Float32Array, Float64Array, Int64Array,
    StringArray, TimestampSecondArray,
};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use csvtable::{
    read_csv, ColumnTypeSpec, ColumnTypes, ConvertOptions, CsvError, CsvOptions, CsvTableReader,
    ErrorKind, ParseOptions, ReadOptions, Table,
};
use proptest::prelude::*;
use std::io::{Cursor, Read, Write};
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_test_writer()
        .try_init();
}

/// Read serially and threaded; both must agree.
fn read_with(data: &[u8], read: ReadOptions, parse: &ParseOptions, convert: &ConvertOptions) -> Table {
    init_test_logging();
    let serial = read_csv(Cursor::new(data), &read.clone().with_use_threads(false), parse, convert)
        .unwrap();
    let threaded = read_csv(Cursor::new(data), &read.with_use_threads(true), parse, convert)
        .unwrap();
    assert_eq!(serial.record_batch(), threaded.record_batch());
    serial
}

fn read_bytes(data: &[u8]) -> Table {
    read_with(data, ReadOptions::default(), &ParseOptions::default(), &ConvertOptions::default())
}

fn read_err_with(data: &[u8], read: ReadOptions, parse: &ParseOptions, convert: &ConvertOptions) -> CsvError {
    init_test_logging();
    let serial = read_csv(Cursor::new(data), &read.clone().with_use_threads(false), parse, convert)
        .unwrap_err();
    let threaded = read_csv(Cursor::new(data), &read.with_use_threads(true), parse, convert)
        .unwrap_err();
    assert_eq!(serial.to_string(), threaded.to_string());
    serial
}

fn read_err(data: &[u8]) -> CsvError {
    read_err_with(data, ReadOptions::default(), &ParseOptions::default(), &ConvertOptions::default())
}

fn types(table: &Table) -> Vec<DataType> {
    table.schema().fields().iter().map(|f| f.data_type().clone()).collect()
}

fn ints(table: &Table, name: &str) -> Vec<Option<i64>> {
    let col = table.column_by_name(name).unwrap();
    col.as_any().downcast_ref::<Int64Array>().unwrap().iter().collect()
}

fn floats(table: &Table, name: &str) -> Vec<Option<f64>> {
    let col = table.column_by_name(name).unwrap();
    col.as_any().downcast_ref::<Float64Array>().unwrap().iter().collect()
}

fn bools(table: &Table, name: &str) -> Vec<Option<bool>> {
    let col = table.column_by_name(name).unwrap();
    col.as_any().downcast_ref::<BooleanArray>().unwrap().iter().collect()
}

fn strings(table: &Table, name: &str) -> Vec<Option<String>> {
    let col = table.column_by_name(name).unwrap();
    col.as_any()
        .downcast_ref::<StringArray>()
        .unwrap()
        .iter()
        .map(|v| v.map(str::to_string))
        .collect()
}

fn some_strings(values: &[&str]) -> Vec<Option<String>> {
    values.iter().map(|s| Some(s.to_string())).collect()
}

#[test]
fn header_only_gives_zero_null_columns() {
    let table = read_bytes(b"a,b,c\n");
    assert_eq!(table.column_names(), vec!["a", "b", "c"]);
    assert_eq!(table.num_rows(), 0);
    assert_eq!(types(&table), vec![DataType::Null; 3]);
}

#[test]
fn header_only_keeps_forced_types() {
    let convert = ConvertOptions::default()
        .with_column_types(ColumnTypes::from_names([("b", "int64")]).unwrap());
    let table = read_with(b"a,b\n", ReadOptions::default(), &ParseOptions::default(), &convert);
    assert_eq!(types(&table), vec![DataType::Null, DataType::Int64]);
}

#[test]
fn bom_is_stripped() {
    let table = read_bytes(b"\xef\xbb\xbfa,b\n1,2\n");
    assert_eq!(table.column_names(), vec!["a", "b"]);
    assert_eq!(ints(&table, "a"), vec![Some(1)]);
}

#[test]
fn skip_rows_header_mode() {
    let rows = b"ab,cd\nef,gh\nij,kl\nmn,op\n";
    let parse = ParseOptions::default();
    let convert = ConvertOptions::default();

    let table = read_with(rows, ReadOptions::default().with_skip_rows(1), &parse, &convert);
    assert_eq!(table.column_names(), vec!["ef", "gh"]);
    assert_eq!(strings(&table, "ef"), some_strings(&["ij", "mn"]));
    assert_eq!(strings(&table, "gh"), some_strings(&["kl", "op"]));

    let table = read_with(rows, ReadOptions::default().with_skip_rows(3), &parse, &convert);
    assert_eq!(table.column_names(), vec!["mn", "op"]);
    assert_eq!(table.num_rows(), 0);

    let err = read_err_with(rows, ReadOptions::default().with_skip_rows(4), &parse, &convert);
    assert_eq!(err.kind(), ErrorKind::Format);
}

#[test]
fn skip_rows_with_column_names() {
    let rows = b"ab,cd\nef,gh\nij,kl\nmn,op\n";
    let parse = ParseOptions::default();
    let convert = ConvertOptions::default();
    let read = ReadOptions::default().with_column_names(["x", "y"]);

    let table = read_with(rows, read.clone().with_skip_rows(3), &parse, &convert);
    assert_eq!(strings(&table, "x"), some_strings(&["mn"]));
    assert_eq!(strings(&table, "y"), some_strings(&["op"]));

    let table = read_with(rows, read.clone().with_skip_rows(4), &parse, &convert);
    assert_eq!(table.column_names(), vec!["x", "y"]);
    assert_eq!(table.num_rows(), 0);

    let err = read_err_with(rows, read.with_skip_rows(5), &parse, &convert);
    assert!(matches!(err, CsvError::NotEnoughRows { .. }));

    let err = read_err_with(
        rows,
        ReadOptions::default().with_column_names(["x", "y", "z"]),
        &parse,
        &convert,
    );
    assert!(err.to_string().contains("Expected 3 columns, got 2"));
}

#[test]
fn skipped_rows_are_not_validated() {
    let rows = b"title line\nsecond,line,has,more\na,b\n1,2\n";
    let table = read_with(
        rows,
        ReadOptions::default().with_skip_rows(2),
        &ParseOptions::default(),
        &ConvertOptions::default(),
    );
    assert_eq!(table.column_names(), vec!["a", "b"]);
    assert_eq!(ints(&table, "b"), vec![Some(2)]);
}

#[test]
fn simple_varied_inference() {
    let table = read_bytes(b"a,b,c,d\n1,2,3,0\n4.0,-5,foo,True\n");
    assert_eq!(
        types(&table),
        vec![DataType::Float64, DataType::Int64, DataType::Utf8, DataType::Boolean]
    );
    assert_eq!(floats(&table, "a"), vec![Some(1.0), Some(4.0)]);
    assert_eq!(ints(&table, "b"), vec![Some(2), Some(-5)]);
    assert_eq!(strings(&table, "c"), some_strings(&["3", "foo"]));
    assert_eq!(bools(&table, "d"), vec![Some(false), Some(true)]);
}

#[test]
fn simple_nulls() {
    let rows = b"a,b,,d,e,f\n\
                 1,2,,,3,N/A\n\
                 nan,-5,foo,,nan,TRUE\n\
                 4.5,#N/A,nan,,\xff,false\n";
    let table = read_bytes(rows);
    assert_eq!(
        types(&table),
        vec![
            DataType::Float64,
            DataType::Int64,
            DataType::Utf8,
            DataType::Null,
            DataType::Binary,
            DataType::Boolean
        ]
    );
    assert_eq!(floats(&table, "a"), vec![Some(1.0), None, Some(4.5)]);
    assert_eq!(ints(&table, "b"), vec![Some(2), Some(-5), None]);
    assert_eq!(strings(&table, ""), some_strings(&["", "foo", "nan"]));
    assert_eq!(table.column_by_name("d").unwrap().len(), 3);
    let e = table.column_by_name("e").unwrap();
    let e: Vec<Option<&[u8]>> = e.as_any().downcast_ref::<BinaryArray>().unwrap().iter().collect();
    assert_eq!(e, vec![Some(&b"3"[..]), Some(&b"nan"[..]), Some(&b"\xff"[..])]);
    assert_eq!(bools(&table, "f"), vec![None, Some(true), Some(false)]);
}

#[test]
fn timestamps_and_years() {
    let table = read_bytes(b"a,b\n1970,1970-01-01\n1989,1989-07-14T01:00:00Z\n");
    assert_eq!(
        types(&table),
        vec![DataType::Int64, DataType::Timestamp(TimeUnit::Second, None)]
    );
    let col = table.column_by_name("b").unwrap();
    let col = col.as_any().downcast_ref::<TimestampSecondArray>().unwrap();
    assert_eq!(col.value(0), 0);
    assert_eq!(col.value(1), 616_381_200);
}

#[test]
fn custom_nulls() {
    let rows = b"a,b,c,d\nZzz,Xxx,1,2\nXxx,#N/A,,Zzz\n";
    let read = ReadOptions::default();
    let parse = ParseOptions::default();

    let convert = ConvertOptions::default().with_null_values(["Xxx", "Zzz"]);
    let table = read_with(rows, read.clone(), &parse, &convert);
    assert_eq!(types(&table)[0], DataType::Null);
    assert_eq!(strings(&table, "b"), some_strings(&["Xxx", "#N/A"]));
    assert_eq!(strings(&table, "c"), some_strings(&["1", ""]));
    assert_eq!(ints(&table, "d"), vec![Some(2), None]);

    let convert = convert.with_strings_can_be_null(true);
    let table = read_with(rows, read.clone(), &parse, &convert);
    assert_eq!(strings(&table, "b"), vec![None, Some("#N/A".to_string())]);
    assert_eq!(strings(&table, "c"), some_strings(&["1", ""]));

    let convert = ConvertOptions::default().with_null_values(Vec::<String>::new());
    let table = read_with(rows, read, &parse, &convert);
    assert_eq!(strings(&table, "a"), some_strings(&["Zzz", "Xxx"]));
    assert_eq!(strings(&table, "b"), some_strings(&["Xxx", "#N/A"]));
    assert_eq!(strings(&table, "d"), some_strings(&["2", "Zzz"]));
}

#[test]
fn custom_bools() {
    let rows = b"a,b,c\nTrue,T,t\nFalse,F,f\nTrue,yes,yes\nFalse,no,no\nN/A,N/A,N/A\n";
    let convert = ConvertOptions::default()
        .with_true_values(["T", "yes"])
        .with_false_values(["F", "no"]);
    let table = read_with(rows, ReadOptions::default(), &ParseOptions::default(), &convert);
    assert_eq!(types(&table), vec![DataType::Utf8, DataType::Boolean, DataType::Utf8]);
    assert_eq!(
        strings(&table, "a"),
        some_strings(&["True", "False", "True", "False", "N/A"])
    );
    assert_eq!(
        bools(&table, "b"),
        vec![Some(true), Some(false), Some(true), Some(false), None]
    );
    assert_eq!(strings(&table, "c"), some_strings(&["t", "f", "yes", "no", "N/A"]));
}

fn check_forced_columns(table: &Table) {
    assert_eq!(
        types(table),
        vec![
            DataType::Int64,
            DataType::Float32,
            DataType::Utf8,
            DataType::Boolean,
            DataType::Decimal128(11, 2)
        ]
    );
    assert_eq!(ints(table, "a"), vec![Some(1), Some(4)]);
    let b = table.column_by_name("b").unwrap();
    let b: Vec<Option<f32>> = b.as_any().downcast_ref::<Float32Array>().unwrap().iter().collect();
    assert_eq!(b, vec![Some(2.0), Some(-5.0)]);
    assert_eq!(strings(table, "c"), some_strings(&["3", "6"]));
    assert_eq!(bools(table, "d"), vec![Some(true), Some(false)]);
    let e = table.column_by_name("e").unwrap();
    let e = e.as_any().downcast_ref::<Decimal128Array>().unwrap();
    assert_eq!(e.value_as_string(0), "1.00");
    assert_eq!(e.value_as_string(1), "0.00");
}

#[test]
fn forced_column_types() {
    let rows = b"a,b,c,d,e\n1,2,3,true,1.0\n4,-5,6,false,0\n";
    let read = ReadOptions::default();
    let parse = ParseOptions::default();

    let by_name = ColumnTypes::from_names([
        ("b", "float32"),
        ("c", "string"),
        ("d", "boolean"),
        ("e", "decimal128(11, 2)"),
        ("zz", "null"),
    ])
    .unwrap();
    let convert = ConvertOptions::default().with_column_types(by_name);
    check_forced_columns(&read_with(rows, read.clone(), &parse, &convert));

    let schema = Arc::new(Schema::new(vec![
        Field::new("b", DataType::Float32, true),
        Field::new("c", DataType::Utf8, true),
        Field::new("d", DataType::Boolean, true),
        Field::new("e", DataType::Decimal128(11, 2), true),
        Field::new("zz", DataType::Boolean, true),
    ]));
    let by_schema = ColumnTypes::try_from(ColumnTypeSpec::Schema(schema)).unwrap();
    let convert = ConvertOptions::default().with_column_types(by_schema);
    check_forced_columns(&read_with(rows, read.clone(), &parse, &convert));

    let err = read_err_with(
        b"a,b,c,d,e\n1,XXX,3,true,5\n4,-5,6,false,7\n",
        read,
        &parse,
        &convert,
    );
    let msg = err.to_string();
    assert!(msg.contains("In CSV column #1: "), "{msg}");
    assert!(msg.contains("CSV conversion error to float: invalid value 'XXX'"), "{msg}");
    assert_eq!(err.kind(), ErrorKind::Conversion);
}

#[test]
fn no_trailing_newline_and_lone_delimiter() {
    let table = read_bytes(b"a,b\n1,2");
    assert_eq!(ints(&table, "b"), vec![Some(2)]);

    let table = read_bytes(b",\n\n");
    assert_eq!(table.column_names(), vec!["", ""]);
    assert_eq!(table.num_rows(), 0);
}

#[test]
fn invalid_row_shapes() {
    let err = read_err(b"a,b,c\n1,2\n");
    assert!(err.to_string().contains("Expected 3 columns, got 2"));
    let err = read_err(b"a,b,c\n1,2,3\n4");
    assert!(err.to_string().contains("Expected 3 columns, got 1"));
}

#[test]
fn empty_inputs_are_rejected() {
    for data in [&b""[..], b"\n", b"\r\n", b"\r", b"\n\n"] {
        let err = read_err(data);
        assert_eq!(err.to_string(), "Empty CSV file", "{data:?}");
    }
}

#[test]
fn delimiter_override() {
    let rows = b"a;b,c\nde,fg;eh\n";
    let table = read_bytes(rows);
    assert_eq!(table.column_names(), vec!["a;b", "c"]);
    assert_eq!(strings(&table, "a;b"), some_strings(&["de"]));
    assert_eq!(strings(&table, "c"), some_strings(&["fg;eh"]));

    let parse = ParseOptions::default().with_delimiter(b';');
    let table = read_with(rows, ReadOptions::default(), &parse, &ConvertOptions::default());
    assert_eq!(table.column_names(), vec!["a", "b,c"]);
    assert_eq!(strings(&table, "a"), some_strings(&["de,fg"]));
    assert_eq!(strings(&table, "b,c"), some_strings(&["eh"]));
}

#[test]
fn quoted_newlines_across_small_blocks() {
    let rows = b"a,b\n\"line\none\",1\n\"x\",2\n";
    let parse = ParseOptions::default().with_newlines_in_values(true);
    for block_size in [1, 3, 7, 64] {
        let table = read_with(
            rows,
            ReadOptions::default().with_block_size(block_size),
            &parse,
            &ConvertOptions::default(),
        );
        assert_eq!(strings(&table, "a"), some_strings(&["line\none", "x"]));
        assert_eq!(ints(&table, "b"), vec![Some(1), Some(2)]);
    }
}

#[test]
fn invalid_options_fail_before_reading() {
    struct Untouched;
    impl Read for Untouched {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            panic!("source must not be read");
        }
    }
    let parse = ParseOptions::default().with_quote_char(Some(b','));
    let err = read_csv(Untouched, &ReadOptions::default(), &parse, &ConvertOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);

    let read = ReadOptions::default().with_block_size(0);
    let err = read_csv(Untouched, &read, &ParseOptions::default(), &ConvertOptions::default())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Configuration);
}

#[test]
fn source_is_left_open() {
    let mut file = tempfile::tempfile().unwrap();
    file.write_all(b"a\n1\n").unwrap();
    std::io::Seek::rewind(&mut file).unwrap();
    let table = read_csv(
        &mut file,
        &ReadOptions::default(),
        &ParseOptions::default(),
        &ConvertOptions::default(),
    )
    .unwrap();
    assert_eq!(table.num_rows(), 1);
    // still usable afterwards
    file.write_all(b"2\n").unwrap();
}

fn write_rows(rows: &[Vec<i64>], crlf: bool, trailing: bool) -> Vec<u8> {
    let eol = if crlf { "\r\n" } else { "\n" };
    let cols = rows.first().map_or(0, Vec::len);
    let mut out = (0..cols).map(|c| format!("c{c}")).collect::<Vec<_>>().join(",");
    for row in rows {
        out.push_str(eol);
        out.push_str(&row.iter().map(i64::to_string).collect::<Vec<_>>().join(","));
    }
    if trailing {
        out.push_str(eol);
    }
    out.into_bytes()
}

#[test]
fn stress_block_sizes() {
    let rows: Vec<Vec<i64>> = (0..500)
        .map(|i| (0..5).map(|c| (i * 7919 + c * 104_729) % 100_003 - 50_000).collect())
        .collect();
    for trailing in [true, false] {
        let data = write_rows(&rows, true, trailing);
        for block_size in [11, 12, 13, 17, 37, 111] {
            let table = read_with(
                &data,
                ReadOptions::default().with_block_size(block_size),
                &ParseOptions::default(),
                &ConvertOptions::default(),
            );
            assert_eq!(table.num_rows(), rows.len());
            for c in 0..5 {
                let want: Vec<Option<i64>> = rows.iter().map(|r| Some(r[c])).collect();
                assert_eq!(ints(&table, &format!("c{c}")), want);
            }
        }
    }
}

#[test]
fn reader_and_options_file() {
    let dir = tempfile::tempdir().unwrap();
    let opts_path = dir.path().join("opts.json");
    std::fs::write(
        &opts_path,
        r#"{"parse": {"delimiter": ";"}, "convert": {"column_types": {"b": "double"}}}"#,
    )
    .unwrap();
    let options = CsvOptions::from_json_file(&opts_path).unwrap();

    let csv_path = dir.path().join("data.csv");
    std::fs::write(&csv_path, "a;b\n1;2\n").unwrap();
    let table = CsvTableReader::new(options).read_path(&csv_path).unwrap();
    assert_eq!(types(&table), vec![DataType::Int64, DataType::Float64]);
}

#[test]
fn gzip_and_zip_inputs() {
    use flate2::{write::GzEncoder, Compression as GzLevel};
    use zip::write::SimpleFileOptions;

    let dir = tempfile::tempdir().unwrap();
    let data = b"a,b\n1,x\n2,y\n";

    let gz_path = dir.path().join("data.csv.gz");
    let mut enc = GzEncoder::new(Vec::new(), GzLevel::default());
    enc.write_all(data).unwrap();
    std::fs::write(&gz_path, enc.finish().unwrap()).unwrap();

    let zip_path = dir.path().join("data.zip");
    {
        let file = std::fs::File::create(&zip_path).unwrap();
        let mut zip = zip::ZipWriter::new(file);
        zip.start_file("readme.txt", SimpleFileOptions::default()).unwrap();
        zip.write_all(b"not csv").unwrap();
        zip.start_file("data.csv", SimpleFileOptions::default()).unwrap();
        zip.write_all(data).unwrap();
        zip.finish().unwrap();
    }

    let reader = CsvTableReader::default();
    for path in [&gz_path, &zip_path] {
        let table = reader.read_path(path).unwrap();
        assert_eq!(ints(&table, "a"), vec![Some(1), Some(2)]);
        assert_eq!(strings(&table, "b"), some_strings(&["x", "y"]));
    }

    let bz_path = dir.path().join("data.csv.bz2");
    std::fs::write(&bz_path, b"BZh").unwrap();
    let err = reader.read_path(&bz_path).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::UnsupportedFormat);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    #[test]
    fn block_size_does_not_change_result(
        rows in prop::collection::vec(prop::collection::vec(any::<i64>(), 3), 1..40),
        block_size in 1usize..64,
        crlf in any::<bool>(),
        trailing in any::<bool>(),
    ) {
        let data = write_rows(&rows, crlf, trailing);
        let parse = ParseOptions::default();
        let convert = ConvertOptions::default();
        let whole = read_csv(Cursor::new(&data), &ReadOptions::default(), &parse, &convert).unwrap();
        let small = read_with(&data, ReadOptions::default().with_block_size(block_size), &parse, &convert);
        prop_assert_eq!(whole.record_batch(), small.record_batch());

        for c in 0..3 {
            let want: Vec<Option<i64>> = rows.iter().map(|r| Some(r[c])).collect();
            prop_assert_eq!(ints(&small, &format!("c{c}")), want);
        }
    }

    #[test]
    fn block_size_does_not_change_any_dialect(
        data in prop::collection::vec(
            prop::sample::select(vec![b'a', b'1', b',', b'"', b'\n', b'\r', b'\\']),
            0..48,
        ),
    ) {
        for parse in dialects() {
            let whole = outcome(&data, 1 << 20, false, &parse);
            for block_size in 1..=8 {
                for use_threads in [false, true] {
                    let small = outcome(&data, block_size, use_threads, &parse);
                    prop_assert_eq!(
                        &small,
                        &whole,
                        "block_size={} threads={} parse={:?}",
                        block_size,
                        use_threads,
                        parse
                    );
                }
            }
        }
    }
}

fn dialects() -> Vec<ParseOptions> {
    vec![
        ParseOptions::default(),
        ParseOptions::default().with_escape_char(Some(b'\\')),
        ParseOptions::default().with_double_quote(false),
        ParseOptions::default().with_ignore_empty_lines(false),
        ParseOptions::default().with_quote_char(None),
        ParseOptions::default().with_newlines_in_values(true),
        ParseOptions::default()
            .with_newlines_in_values(true)
            .with_escape_char(Some(b'\\')),
    ]
}

/// The table, or the error text, for one read configuration.
fn outcome(
    data: &[u8],
    block_size: usize,
    use_threads: bool,
    parse: &ParseOptions,
) -> Result<arrow::record_batch::RecordBatch, String> {
    let read = ReadOptions::default()
        .with_block_size(block_size)
        .with_use_threads(use_threads);
    read_csv(Cursor::new(data), &read, parse, &ConvertOptions::default())
        .map(Table::into_record_batch)
        .map_err(|e| e.to_string())
}
