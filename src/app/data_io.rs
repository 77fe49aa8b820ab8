use std::fs::File;
use std::io::{self, Write};

use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

use super::api::{CatalogApp, Review};
use super::types::DataFormat;

const CSV_HEADERS: [&str; 9] = [
    "app_id",
    "app_name",
    "review_id",
    "author",
    "rating",
    "title",
    "content",
    "version",
    "submitted_at",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ExportRecord {
    app_id: String,
    app_name: String,
    review_id: String,
    author: String,
    rating: u8,
    title: String,
    content: String,
    version: String,
    submitted_at: String,
}

fn review_to_export_record(app: &CatalogApp, review: &Review) -> ExportRecord {
    ExportRecord {
        app_id: app.id.clone(),
        app_name: app.name.clone(),
        review_id: review.id.clone(),
        author: review.author.clone(),
        rating: review.rating,
        title: review.title.clone(),
        content: review.content.clone(),
        version: review.version.clone().unwrap_or_default(),
        submitted_at: review
            .submitted_at
            .to_rfc3339_opts(SecondsFormat::Secs, true),
    }
}

/// Writes the reviews to `path` and returns how many were written.
pub(crate) fn export_reviews<'a>(
    path: &str,
    format: DataFormat,
    app: &CatalogApp,
    reviews: impl IntoIterator<Item = &'a Review>,
) -> io::Result<usize> {
    let records = reviews
        .into_iter()
        .map(|review| review_to_export_record(app, review))
        .collect::<Vec<_>>();

    match format {
        DataFormat::Csv => {
            let mut writer = csv::Writer::from_path(path)?;
            writer.write_record(CSV_HEADERS)?;
            for rec in &records {
                let rating = rec.rating.to_string();
                writer.write_record([
                    rec.app_id.as_str(),
                    rec.app_name.as_str(),
                    rec.review_id.as_str(),
                    rec.author.as_str(),
                    rating.as_str(),
                    rec.title.as_str(),
                    rec.content.as_str(),
                    rec.version.as_str(),
                    rec.submitted_at.as_str(),
                ])?;
            }
            writer.flush()?;
        }
        DataFormat::Json => {
            let mut file = File::create(path)?;
            serde_json::to_writer_pretty(&mut file, &records).map_err(io::Error::other)?;
            file.write_all(b"\n")?;
            file.flush()?;
        }
    }

    Ok(records.len())
}

pub(crate) fn detect_data_format(path: &str, fallback: DataFormat) -> DataFormat {
    let lower = path.to_ascii_lowercase();
    if lower.ends_with(".json") {
        DataFormat::Json
    } else if lower.ends_with(".csv") {
        DataFormat::Csv
    } else {
        fallback
    }
}

pub(crate) fn default_export_path(app_id: &str, format: DataFormat) -> String {
    let slug = app_id
        .chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' {
                ch
            } else {
                '_'
            }
        })
        .collect::<String>();
    let ts = Utc::now().format("%Y%m%d_%H%M%S");
    match format {
        DataFormat::Csv => format!("reviews_{slug}_{ts}.csv"),
        DataFormat::Json => format!("reviews_{slug}_{ts}.json"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::fs;

    fn sample() -> (CatalogApp, Vec<Review>) {
        let app = CatalogApp {
            id: "notes".to_string(),
            name: "Notes, Pro".to_string(),
            developer: None,
            platform: None,
        };
        let reviews = vec![
            Review {
                id: "r1".to_string(),
                author: "ann".to_string(),
                rating: 5,
                title: "Love it".to_string(),
                content: "Line one\nline \"two\"".to_string(),
                version: Some("1.2".to_string()),
                submitted_at: Utc
                    .with_ymd_and_hms(2026, 10, 1, 9, 30, 0)
                    .single()
                    .expect("valid timestamp"),
            },
            Review {
                id: "r2".to_string(),
                author: "bob".to_string(),
                rating: 2,
                title: "Meh".to_string(),
                content: String::new(),
                version: None,
                submitted_at: Utc
                    .with_ymd_and_hms(2026, 10, 2, 9, 30, 0)
                    .single()
                    .expect("valid timestamp"),
            },
        ];
        (app, reviews)
    }

    #[test]
    fn csv_export_quotes_fields_and_writes_header() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("out.csv").to_string_lossy().to_string();
        let (app, reviews) = sample();

        let written = export_reviews(&path, DataFormat::Csv, &app, &reviews).expect("export");
        assert_eq!(written, 2);

        let mut reader = csv::Reader::from_path(&path).expect("reader");
        let headers = reader.headers().expect("headers").clone();
        assert_eq!(headers.iter().collect::<Vec<_>>(), CSV_HEADERS.to_vec());
        let rows = reader
            .deserialize::<ExportRecord>()
            .collect::<Result<Vec<_>, _>>()
            .expect("rows");
        assert_eq!(rows[0].app_name, "Notes, Pro");
        assert_eq!(rows[0].content, "Line one\nline \"two\"");
        assert_eq!(rows[0].submitted_at, "2026-10-01T09:30:00Z");
        assert_eq!(rows[1].rating, 2);
        assert!(rows[1].version.is_empty());
    }

    #[test]
    fn json_export_is_an_array() {
        let dir = tempfile::tempdir().expect("temp dir");
        let path = dir.path().join("out.json").to_string_lossy().to_string();
        let (app, reviews) = sample();

        export_reviews(&path, DataFormat::Json, &app, reviews.iter().skip(1)).expect("export");
        let content = fs::read_to_string(&path).expect("read back");
        let records: Vec<ExportRecord> = serde_json::from_str(&content).expect("json array");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].review_id, "r2");
        assert_eq!(records[0].rating, 2);
    }

    #[test]
    fn format_detection_prefers_extension() {
        assert_eq!(detect_data_format("a.JSON", DataFormat::Csv), DataFormat::Json);
        assert_eq!(detect_data_format("a.csv", DataFormat::Json), DataFormat::Csv);
        assert_eq!(detect_data_format("a.txt", DataFormat::Json), DataFormat::Json);
    }

    #[test]
    fn default_path_is_filesystem_safe() {
        let path = default_export_path("com.example/app", DataFormat::Json);
        assert!(path.starts_with("reviews_com_example_app_"));
        assert!(path.ends_with(".json"));
    }
}
