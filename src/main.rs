use anyhow::{anyhow, bail, Context, Result};
use csvtable::{ColumnTypes, CsvOptions, CsvTableReader, ErrorKind, Table};
use parquet::{arrow::ArrowWriter, basic::Compression, file::properties::WriterProperties};
use std::{
    env, fs,
    fs::File,
    path::{Path, PathBuf},
    process::exit,
    time::Instant,
};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, EnvFilter};

const USAGE: &str = "Usage: csvtable [--delimiter C] [--block-size N] [--skip-rows N] \
[--no-threads] [--column-types JSON] [--options FILE] [--inspect] <GLOB> [OUT_DIR]";

#[derive(Debug)]
struct CliArgs {
    options: CsvOptions,
    pattern: String,
    out_dir: Option<PathBuf>,
    inspect: bool,
}

fn next_value<'a>(iter: &mut impl Iterator<Item = &'a String>, flag: &str) -> Result<&'a String> {
    iter.next().ok_or_else(|| anyhow!("{flag} needs a value"))
}

/// Flags override whatever `--options` loads, regardless of order.
fn parse_args(args: &[String]) -> Result<CliArgs> {
    let mut options_file = None;
    let mut delimiter = None;
    let mut block_size = None;
    let mut skip_rows = None;
    let mut column_types = None;
    let mut no_threads = false;
    let mut inspect = false;
    let mut positional = Vec::new();

    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--delimiter" => {
                let v = next_value(&mut iter, arg)?;
                match v.as_bytes() {
                    [b] => delimiter = Some(*b),
                    _ if v == "\\t" => delimiter = Some(b'\t'),
                    _ => bail!("--delimiter must be a single byte, got {v:?}"),
                }
            }
            "--block-size" => {
                let v = next_value(&mut iter, arg)?;
                block_size = Some(v.parse::<usize>().context("parsing --block-size")?);
            }
            "--skip-rows" => {
                let v = next_value(&mut iter, arg)?;
                skip_rows = Some(v.parse::<usize>().context("parsing --skip-rows")?);
            }
            "--column-types" => {
                let v = next_value(&mut iter, arg)?;
                let json: serde_json::Value =
                    serde_json::from_str(v).context("parsing --column-types JSON")?;
                column_types = Some(ColumnTypes::from_json(&json)?);
            }
            "--options" => options_file = Some(PathBuf::from(next_value(&mut iter, arg)?)),
            "--no-threads" => no_threads = true,
            "--inspect" => inspect = true,
            flag if flag.starts_with("--") => bail!("unknown flag {flag}"),
            _ => positional.push(arg.clone()),
        }
    }

    let mut options = match options_file {
        Some(path) => CsvOptions::from_json_file(&path)
            .with_context(|| format!("loading options from {}", path.display()))?,
        None => CsvOptions::default(),
    };
    if let Some(d) = delimiter {
        options.parse.set_delimiter(d)?;
    }
    if let Some(n) = block_size {
        options.read.set_block_size(n)?;
    }
    if let Some(n) = skip_rows {
        options.read.skip_rows = n;
    }
    if let Some(types) = column_types {
        options.convert.column_types = types;
    }
    if no_threads {
        options.read.use_threads = false;
    }

    let mut positional = positional.into_iter();
    let pattern = positional.next().ok_or_else(|| anyhow!("missing <GLOB>"))?;
    let out_dir = positional.next().map(PathBuf::from);
    if let Some(extra) = positional.next() {
        bail!("unexpected argument {extra}");
    }
    if out_dir.is_none() && !inspect {
        bail!("missing <OUT_DIR>");
    }

    Ok(CliArgs {
        options,
        pattern,
        out_dir,
        inspect,
    })
}

/// `data.csv.gz` → `data`
fn output_stem(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "table".into());
    let mut stem = name.as_str();
    for suffix in [".gz", ".gzip", ".zip", ".bz2"] {
        if let Some(s) = stem.strip_suffix(suffix) {
            stem = s;
            break;
        }
    }
    for suffix in [".csv", ".CSV", ".tsv", ".txt"] {
        if let Some(s) = stem.strip_suffix(suffix) {
            stem = s;
            break;
        }
    }
    stem.to_string()
}

/// Write `table` to `<out_dir>/<stem>.parquet` through a temp file.
fn write_parquet(table: &Table, out_dir: &Path, stem: &str) -> Result<PathBuf> {
    let final_path = out_dir.join(format!("{stem}.parquet"));
    let tmp_path = out_dir.join(format!("{stem}.parquet.tmp"));

    let tmp_file = File::create(&tmp_path).context("creating temporary Parquet file")?;
    let props = WriterProperties::builder()
        .set_compression(Compression::SNAPPY)
        .build();
    let mut writer = ArrowWriter::try_new(tmp_file, table.schema(), Some(props))
        .context("initializing Parquet writer")?;
    writer
        .write(table.record_batch())
        .context("writing batch to Parquet")?;
    writer.close().context("closing Parquet writer")?;

    fs::rename(&tmp_path, &final_path).context("renaming Parquet file")?;
    Ok(final_path)
}

fn print_table_summary(path: &Path, table: &Table) {
    println!("=== {} ===", path.display());
    println!("Rows:    {}", table.num_rows());
    println!("Columns: {}", table.num_columns());
    for field in table.schema().fields() {
        println!(
            "- {:<30} | {}",
            field.name(),
            csvtable::type_name(field.data_type())
        );
    }
    println!();
}

fn run(cli: CliArgs) -> Result<()> {
    let reader = CsvTableReader::new(cli.options);
    debug!(options = ?reader.options(), "reader configured");
    if let Some(dir) = &cli.out_dir {
        fs::create_dir_all(dir)?;
    }

    let paths: Vec<PathBuf> = glob::glob(&cli.pattern)
        .with_context(|| format!("invalid glob pattern {}", cli.pattern))?
        .filter_map(|entry| match entry {
            Ok(p) if p.is_file() => Some(p),
            Ok(_) => None,
            Err(e) => {
                warn!("unreadable glob entry: {}", e);
                None
            }
        })
        .collect();
    info!("{} input files match {}", paths.len(), cli.pattern);

    let mut written = 0usize;
    let mut skipped = 0usize;
    for path in &paths {
        let start = Instant::now();
        let table = match reader.read_path(path) {
            Ok(t) => t,
            Err(e) if e.kind() == ErrorKind::UnsupportedFormat => {
                warn!(path = %path.display(), "skipping: {}", e);
                skipped += 1;
                continue;
            }
            Err(e) => return Err(e).with_context(|| format!("reading {}", path.display())),
        };
        debug!(
            path = %path.display(),
            rows = table.num_rows(),
            elapsed = ?start.elapsed(),
            "read table"
        );

        if cli.inspect {
            print_table_summary(path, &table);
            continue;
        }
        if let Some(dir) = &cli.out_dir {
            let out = write_parquet(&table, dir, &output_stem(path))
                .with_context(|| format!("writing parquet for {}", path.display()))?;
            info!(
                rows = table.num_rows(),
                "{} → {}",
                path.display(),
                out.display()
            );
            written += 1;
        }
    }

    info!(written, skipped, "done");
    Ok(())
}

fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder().with_env_filter(filter).init();

    // ─── 2) parse args ───────────────────────────────────────────────
    let args: Vec<String> = env::args().skip(1).collect();
    let cli = match parse_args(&args) {
        Ok(cli) => cli,
        Err(e) => {
            eprintln!("Error: {e:#}");
            eprintln!("{USAGE}");
            exit(2);
        }
    };

    // ─── 3) convert ──────────────────────────────────────────────────
    run(cli)
}
