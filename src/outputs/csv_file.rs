//! CSV output for fetched comments.
//!
//! Every field is quoted, header included, and lines end with `\n`. The whole
//! file is rendered in memory and written with a single call once
//! acquisition has finished.

use crate::models::{COLUMNS, CommentRecord, OutputRow};
use crate::utils::{clean_text, format_extracted_at};
use chrono::Local;
use csv::{QuoteStyle, Terminator, WriterBuilder};
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{error, info, instrument};

/// Name of the output file for `video_id`.
pub fn output_filename(video_id: &str) -> String {
    format!("youtube_comments_{video_id}.csv")
}

/// Enrich records into output rows sharing one `video_id` and `extracted_at`.
pub fn build_rows(records: &[CommentRecord], video_id: &str, extracted_at: &str) -> Vec<OutputRow> {
    records
        .iter()
        .map(|record| OutputRow {
            video_id: video_id.to_string(),
            author: record.author.clone(),
            published: record.published.clone(),
            text: record.text.clone(),
            clean_text: clean_text(&record.text),
            sentiment_label: String::new(),
            sentiment_score: String::new(),
            sentiment_analysis_at: String::new(),
            extracted_at: extracted_at.to_string(),
        })
        .collect()
}

/// Serialize rows, header first, into CSV bytes.
///
/// The header is written explicitly so an empty run still produces it.
pub fn render_csv(rows: &[OutputRow]) -> Result<Vec<u8>, Box<dyn Error>> {
    let mut wtr = WriterBuilder::new()
        .has_headers(false)
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());

    wtr.write_record(COLUMNS)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    let bytes = wtr.into_inner().map_err(|e| e.into_error())?;
    Ok(bytes)
}

/// Write the comments of one run to `<data_dir>/youtube_comments_<video_id>.csv`.
///
/// Creates `data_dir` (with parents) when missing and replaces any existing
/// file for the same video.
///
/// # Returns
///
/// The path of the written file.
#[instrument(level = "info", skip_all, fields(%video_id, data_dir = %data_dir.display(), count = records.len()))]
pub async fn write_comments(
    records: &[CommentRecord],
    video_id: &str,
    data_dir: &Path,
) -> Result<PathBuf, Box<dyn Error>> {
    let extracted_at = format_extracted_at(&Local::now());
    let rows = build_rows(records, video_id, &extracted_at);
    let body = render_csv(&rows)?;

    if let Err(e) = fs::create_dir_all(data_dir).await {
        error!(error = %e, "Failed to create data dir");
        return Err(e.into());
    }

    let path = data_dir.join(output_filename(video_id));
    fs::write(&path, body).await?;
    info!(path = %path.display(), rows = rows.len(), "Wrote comments CSV");
    Ok(path)
}
