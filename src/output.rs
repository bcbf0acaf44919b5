//! Output formatting for query results, statistics, and diagnostics

use crate::index::compact::CompactSummary;
use crate::index::stats::{IndexStats, format_size, format_timestamp};
use crate::query::ResultSet;
use std::io::{self, Write};
use termcolor::{Color, ColorChoice, ColorSpec, StandardStream, WriteColor};

/// Write a result set as CSV: header row, then one row per match.
///
/// Values are quoted only when they contain the delimiter, a quote, or a
/// line break.
pub fn write_result_set<W: Write>(out: W, result: &ResultSet) -> csv::Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(out);

    writer.write_record(&result.fields)?;
    for row in &result.rows {
        writer.write_record(row)?;
    }
    writer.flush()?;
    Ok(())
}

/// Print a result set to stdout
pub fn print_result_set(result: &ResultSet) -> csv::Result<()> {
    let stdout = io::stdout();
    write_result_set(stdout.lock(), result)
}

/// Print index statistics
pub fn print_stats<W: Write>(out: &mut W, stats: &IndexStats) -> io::Result<()> {
    writeln!(out, "Index Statistics")?;
    writeln!(out, "================")?;
    writeln!(out)?;
    writeln!(out, "Index location:   {}", stats.index_path.display())?;
    writeln!(out, "Index version:    {}", stats.version)?;
    writeln!(out, "Live documents:   {}", stats.live_docs)?;
    writeln!(out, "Superseded:       {}", stats.superseded_docs)?;
    writeln!(out, "Segment count:    {}", stats.segment_count)?;
    writeln!(out, "Index size:       {}", format_size(stats.size_bytes))?;

    writeln!(out)?;
    writeln!(out, "Fields:")?;
    for field in &stats.fields {
        writeln!(out, "  {}", field)?;
    }

    writeln!(out)?;
    writeln!(out, "Created:          {}", format_timestamp(stats.created_at))?;
    writeln!(out, "Updated:          {}", format_timestamp(stats.updated_at))?;
    Ok(())
}

/// Print the outcome of a compaction
pub fn print_compact_summary<W: Write>(out: &mut W, summary: &CompactSummary) -> io::Result<()> {
    if summary.segments_before == summary.segments_after && summary.purged == 0 {
        return writeln!(out, "Index is already compact ({} documents).", summary.live);
    }
    writeln!(
        out,
        "Merged {} segments into {}, purged {} superseded documents ({} live).",
        summary.segments_before, summary.segments_after, summary.purged, summary.live
    )
}

/// Print a one-line diagnostic to stderr, `error:` highlighted when stderr is a terminal
pub fn print_error(message: &str, color: bool) -> io::Result<()> {
    let choice = if color {
        ColorChoice::Auto
    } else {
        ColorChoice::Never
    };
    let mut stderr = StandardStream::stderr(choice);

    stderr.set_color(ColorSpec::new().set_fg(Some(Color::Red)).set_bold(true))?;
    write!(stderr, "error")?;
    stderr.reset()?;
    writeln!(stderr, ": {}", message)
}
