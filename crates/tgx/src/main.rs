use std::{
    io::{self, BufWriter, Write},
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use chrono::Local;
use clap::{Parser, Subcommand};
use tracing::info;

use tgx_core::{
    chunker::Chunker,
    config::Config,
    domain::Record,
    export::{group_by_actor, records, records_rev},
    report::{ChunkReport, ChunkSummary, ReportLog},
    trend,
    utils::{format_timestamp, parse_duration, single_line},
};

#[derive(Parser)]
#[command(name = "tgx", version, about = "Telegram chat export tooling")]
struct Cli {
    /// Dotenv file loaded before reading TGX_* variables.
    #[arg(long = "env-file", global = true, default_value = ".env")]
    env_file: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the most recent messages, newest first.
    Latest {
        input: PathBuf,
        #[arg(short = 'n', long = "limit", default_value_t = 20)]
        limit: usize,
        /// Read buffer in bytes for the backwards scan.
        #[arg(long = "buffer")]
        buffer: Option<usize>,
    },
    /// Batch messages into bounded chunks and log a report per chunk.
    Chunks {
        input: PathBuf,
        #[arg(long = "count-min")]
        count_min: Option<usize>,
        #[arg(long = "count-max")]
        count_max: Option<usize>,
        /// e.g. "30s", "5m"
        #[arg(long = "time-min")]
        time_min: Option<String>,
        /// e.g. "1h", "1h30m"
        #[arg(long = "time-max")]
        time_max: Option<String>,
        /// Do not write the per-run report log.
        #[arg(long = "no-log")]
        no_log: bool,
        /// Plain-text report instead of JSON lines.
        #[arg(long = "plain")]
        plain: bool,
    },
    /// Smoothed inter-arrival gaps for one actor, as CSV.
    Trend {
        input: PathBuf,
        /// Actor to analyze; defaults to the most active one.
        #[arg(short = 'a', long = "actor")]
        actor: Option<String>,
        #[arg(long = "window")]
        window: Option<usize>,
        #[arg(long = "alpha")]
        alpha: Option<f64>,
    },
}

fn main() {
    if let Err(err) = run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    tgx_core::logging::init("tgx")?;

    let cfg = Config::load_from(&cli.env_file)?;
    let mut out = BufWriter::new(io::stdout());
    execute(cli.command, cfg, &mut out)?;
    out.flush()?;
    Ok(())
}

/// Apply command-line overrides on top of `cfg` and run the command.
fn execute(command: Commands, mut cfg: Config, out: &mut impl Write) -> Result<()> {
    match command {
        Commands::Latest {
            input,
            limit,
            buffer,
        } => {
            if let Some(b) = buffer {
                cfg.read_buffer = b;
            }
            cmd_latest(&cfg, &input, limit, out)
        }
        Commands::Chunks {
            input,
            count_min,
            count_max,
            time_min,
            time_max,
            no_log,
            plain,
        } => {
            if let Some(v) = count_min {
                cfg.chunk_count_min = v;
            }
            if let Some(v) = count_max {
                cfg.chunk_count_max = v;
            }
            if let Some(v) = time_min {
                cfg.chunk_time_min = parse_duration(&v).context("--time-min")?;
            }
            if let Some(v) = time_max {
                cfg.chunk_time_max = parse_duration(&v).context("--time-max")?;
            }
            if plain {
                cfg.report_json = false;
            }
            cmd_chunks(&cfg, &input, !no_log, out)
        }
        Commands::Trend {
            input,
            actor,
            window,
            alpha,
        } => {
            if let Some(w) = window {
                cfg.sma_window = w;
            }
            if let Some(a) = alpha {
                cfg.ema_alpha = a;
            }
            cmd_trend(&cfg, &input, actor.as_deref(), out)
        }
    }
}

fn cmd_latest(cfg: &Config, input: &Path, limit: usize, out: &mut impl Write) -> Result<()> {
    for record in records_rev(input, cfg.read_buffer)?.take(limit) {
        let r = record?;
        writeln!(
            out,
            "{}  {}  {}",
            format_timestamp(&r.timestamp),
            r.actor,
            single_line(&r.content)
        )?;
    }
    Ok(())
}

fn cmd_chunks(cfg: &Config, input: &Path, write_log: bool, out: &mut impl Write) -> Result<()> {
    let chunk_cfg = cfg.chunk_config()?;
    // Input is opened before any run log directory is created.
    let mut source = records(input)?;

    let run_at = Local::now();
    let log = if write_log {
        Some(ReportLog::for_run(
            &cfg.report_dir,
            input,
            &run_at,
            cfg.report_json,
            cfg.report_max_text,
        )?)
    } else {
        None
    };

    let mut failure = None;
    let stream = source.by_ref().map_while(|r| match r {
        Ok(record) => Some(record),
        Err(e) => {
            failure = Some(e);
            None
        }
    });

    let mut chunker = Chunker::new(stream, chunk_cfg);
    let mut emitted = 0usize;
    for (index, chunk) in chunker.by_ref().enumerate() {
        let summary = ChunkSummary::of(&chunk);
        writeln!(
            out,
            "chunk {index}: count={} from={} to={} span={}s",
            summary.count, summary.from, summary.to, summary.span_secs
        )?;
        if let Some(log) = &log {
            log.write(&ChunkReport::new(&run_at, index, &chunk))?;
        }
        emitted += 1;
    }
    let discarded = chunker.discarded();
    drop(chunker);

    if let Some(e) = failure {
        return Err(e).context(format!("reading {}", input.display()));
    }

    info!(
        chunks = emitted,
        discarded,
        skipped = source.skipped(),
        "chunking finished"
    );
    if let Some(log) = &log {
        writeln!(out, "saved_to: {}", log.path().display())?;
    }
    Ok(())
}

fn cmd_trend(cfg: &Config, input: &Path, actor: Option<&str>, out: &mut impl Write) -> Result<()> {
    let params = cfg.smoothing()?;
    let mut source = records(input)?;
    let all = source
        .by_ref()
        .collect::<tgx_core::Result<Vec<Record>>>()
        .with_context(|| format!("reading {}", input.display()))?;
    let skipped = source.skipped();
    let groups = group_by_actor(all);

    let picked = match actor {
        Some(a) => groups.into_iter().find(|(name, _)| name == a),
        None => groups.into_iter().next(),
    };
    let Some((name, msgs)) = picked else {
        bail!("no messages found for {}", actor.unwrap_or("any actor"));
    };

    let timestamps: Vec<_> = msgs.iter().map(|r| r.timestamp).collect();
    let series = trend::analyze(&timestamps, params)?;
    info!(
        actor = %name,
        messages = series.len(),
        skipped,
        window = params.window(),
        alpha = params.alpha(),
        "trend computed"
    );

    writeln!(out, "index,elapsed_hours,gap_secs,sma,ema")?;
    for i in 0..series.len() {
        writeln!(
            out,
            "{i},{:.6},{:.3},{:.3},{:.3}",
            series.elapsed[i] / 3600.0,
            series.gaps[i],
            series.sma[i],
            series.ema[i]
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tmp_path(prefix: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or(0);
        let pid = std::process::id();
        PathBuf::from(format!("/tmp/{prefix}-{pid}-{ts}"))
    }

    fn export_line(id: i64, secs: u32, user: i64, message: &str) -> String {
        format!(
            r#"{{"_": "Message", "id": {id}, "date": "2024-05-01T12:{:02}:{:02}+00:00", "message": "{message}", "from_id": {{"_": "PeerUser", "user_id": {user}}}}}"#,
            secs / 60,
            secs % 60,
        )
    }

    fn write_export(prefix: &str, bytes: &[u8]) -> PathBuf {
        let path = tmp_path(prefix).with_extension("jsonl");
        std::fs::write(&path, bytes).unwrap();
        path
    }

    fn test_config(prefix: &str) -> Config {
        Config {
            report_dir: tmp_path(prefix),
            ..Config::default()
        }
    }

    fn run_args(args: &[&str], cfg: Config) -> (Result<()>, String) {
        let cli = Cli::try_parse_from(std::iter::once("tgx").chain(args.iter().copied())).unwrap();
        let mut out = Vec::new();
        let res = execute(cli.command, cfg, &mut out);
        (res, String::from_utf8(out).unwrap())
    }

    fn saved_to(output: &str) -> PathBuf {
        let line = output
            .lines()
            .find_map(|l| l.strip_prefix("saved_to: "))
            .expect("saved_to line");
        PathBuf::from(line)
    }

    #[test]
    fn chunks_with_time_bounds_from_flags() {
        let contents = [
            export_line(1, 0, 42, "m1"),
            export_line(2, 1, 42, "m2"),
            export_line(3, 2, 42, "m3"),
            export_line(4, 20, 42, "m4"),
            export_line(5, 21, 42, "m5"),
        ]
        .join("\n");
        let input = write_export("tgx-cli-bounds", contents.as_bytes());
        let cfg = test_config("tgx-cli-bounds-logs");
        let input_arg = input.to_string_lossy().into_owned();

        let (res, output) = run_args(
            &[
                "chunks",
                &input_arg,
                "--count-min",
                "2",
                "--count-max",
                "3",
                "--time-min",
                "1s",
                "--time-max",
                "5s",
            ],
            cfg,
        );
        res.unwrap();

        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines.len(), 2, "{output}");
        assert_eq!(
            lines[0],
            "chunk 0: count=3 from=2024-05-01 12:00:00 to=2024-05-01 12:00:02 span=2s"
        );
        let log = std::fs::read_to_string(saved_to(&output)).unwrap();
        assert_eq!(log.lines().count(), 1);
    }

    #[test]
    fn chunks_without_output_still_saves_log() {
        let input = write_export("tgx-cli-empty", export_line(1, 0, 42, "only").as_bytes());
        let cfg = test_config("tgx-cli-empty-logs");
        let input_arg = input.to_string_lossy().into_owned();

        let (res, output) = run_args(&["chunks", &input_arg], cfg);
        res.unwrap();

        assert!(!output.contains("chunk 0"), "{output}");
        let path = saved_to(&output);
        assert!(path.is_file(), "{} missing", path.display());
        assert_eq!(std::fs::read_to_string(path).unwrap(), "");
    }

    #[test]
    fn chunks_on_missing_input_leaves_no_log_dir() {
        let cfg = test_config("tgx-cli-missing-logs");
        let report_dir = cfg.report_dir.clone();
        let input = tmp_path("tgx-cli-missing").with_extension("jsonl");
        let input_arg = input.to_string_lossy().into_owned();

        let (res, output) = run_args(&["chunks", &input_arg], cfg);
        let err = res.unwrap_err();

        assert!(output.is_empty());
        assert!(!report_dir.exists());
        let report = format!("{err:#}");
        assert!(report.starts_with("cannot open "), "{report}");
        assert_eq!(report.matches("os error").count(), 1, "{report}");
    }

    #[test]
    fn chunks_stop_on_invalid_utf8_line() {
        let mut bytes = export_line(1, 0, 42, "ok").into_bytes();
        bytes.extend_from_slice(b"\n\xff\xfe\n");
        bytes.extend_from_slice(export_line(2, 1, 42, "after").as_bytes());
        let input = write_export("tgx-cli-utf8", &bytes);
        let cfg = test_config("tgx-cli-utf8-logs");
        let input_arg = input.to_string_lossy().into_owned();

        let (res, output) = run_args(&["chunks", &input_arg, "--no-log"], cfg);
        let err = res.unwrap_err();

        assert!(!output.contains("saved_to"), "{output}");
        let report = format!("{err:#}");
        assert!(report.starts_with("reading "), "{report}");
        assert_eq!(report.matches("UTF-8").count(), 1, "{report}");
    }

    #[test]
    fn chunks_reject_bad_time_flag() {
        let input = write_export("tgx-cli-badflag", export_line(1, 0, 42, "x").as_bytes());
        let input_arg = input.to_string_lossy().into_owned();

        let (res, _) = run_args(
            &["chunks", &input_arg, "--time-min", "soon"],
            test_config("tgx-cli-badflag-logs"),
        );
        assert!(format!("{:#}", res.unwrap_err()).starts_with("--time-min"));
    }

    #[test]
    fn trend_for_named_actor() {
        let contents = [
            export_line(1, 0, 7, "a"),
            export_line(2, 10, 8, "b"),
            export_line(3, 20, 7, "c"),
            export_line(4, 30, 8, "d"),
            export_line(5, 40, 7, "e"),
        ]
        .join("\n");
        let input = write_export("tgx-cli-trend", contents.as_bytes());
        let input_arg = input.to_string_lossy().into_owned();

        let (res, output) = run_args(
            &["trend", &input_arg, "--actor", "8", "--window", "1", "--alpha", "1"],
            test_config("tgx-cli-trend-logs"),
        );
        res.unwrap();

        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(
            lines,
            vec![
                "index,elapsed_hours,gap_secs,sma,ema",
                "0,0.000000,0.000,0.000,0.000",
                "1,0.005556,20.000,20.000,20.000",
            ]
        );
    }

    #[test]
    fn trend_for_unknown_actor_fails() {
        let input = write_export("tgx-cli-trend-none", export_line(1, 0, 7, "a").as_bytes());
        let input_arg = input.to_string_lossy().into_owned();

        let (res, output) = run_args(
            &["trend", &input_arg, "-a", "99"],
            test_config("tgx-cli-trend-none-logs"),
        );
        assert!(res.is_err());
        assert!(output.is_empty());
    }

    #[test]
    fn latest_respects_limit() {
        let contents = [
            export_line(1, 0, 1, "first"),
            export_line(2, 1, 2, "second"),
            export_line(3, 2, 1, "third"),
        ]
        .join("\n")
            + "\n";
        let input = write_export("tgx-cli-latest", contents.as_bytes());
        let input_arg = input.to_string_lossy().into_owned();

        let (res, output) = run_args(
            &["latest", &input_arg, "--limit", "2", "--buffer", "16"],
            test_config("tgx-cli-latest-logs"),
        );
        res.unwrap();

        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(
            lines,
            vec![
                "2024-05-01 12:00:02  1  third",
                "2024-05-01 12:00:01  2  second",
            ]
        );
    }
}
