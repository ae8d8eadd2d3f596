//! JSONL alert journal, one file per UTC day. Doubles as the alert notifier.

use std::fs::{create_dir_all, File, OpenOptions};
use std::io::Write;
use std::path::PathBuf;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, SecondsFormat, Utc};
use common::provider::Notifier;
use common::{AlertNotice, AqiScore, AqiSource, Error, PollutantSample};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

pub fn now_iso() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Append-only journal; the file for a day is opened on its first write.
pub struct AlertJournal {
    dir: PathBuf,
    open_day: Option<(NaiveDate, File)>,
}

impl AlertJournal {
    pub fn open(dir: PathBuf) -> std::io::Result<Self> {
        create_dir_all(&dir)?;
        Ok(Self {
            dir,
            open_day: None,
        })
    }

    pub fn path_for(&self, day: NaiveDate) -> PathBuf {
        self.dir.join(format!("alerts-{}.jsonl", day.format("%Y-%m-%d")))
    }

    pub fn current_file(&self) -> PathBuf {
        self.path_for(Utc::now().date_naive())
    }

    /// Serialize `record` as one line into the file for `at`'s day.
    pub fn write_at<T: Serialize>(&mut self, at: DateTime<Utc>, record: &T) -> common::Result<()> {
        let line = serde_json::to_string(record)?;
        let day = at.date_naive();

        let file = match self.open_day.take() {
            Some((open, file)) if open == day => file,
            _ => OpenOptions::new()
                .create(true)
                .append(true)
                .open(self.path_for(day))?,
        };
        let (_, file) = self.open_day.insert((day, file));
        writeln!(file, "{}", line)?;
        file.flush()?;
        Ok(())
    }
}

/// One alert line: the rendered notice plus its provenance.
#[derive(Debug, Serialize)]
struct AlertRecord<'a> {
    ts: String,
    kind: &'static str,
    subject: String,
    source: AqiSource,
    #[serde(flatten)]
    notice: &'a AlertNotice,
}

/// Records every alert in the journal and logs the rendered notice.
///
/// Delivery over a real transport (mail, push) plugs in at the same trait.
pub struct JournalNotifier {
    journal: Mutex<AlertJournal>,
}

impl JournalNotifier {
    pub fn new(journal: AlertJournal) -> Self {
        Self {
            journal: Mutex::new(journal),
        }
    }

    /// Best-effort lifecycle event; failures are logged, never returned.
    pub async fn write_event(&self, event: serde_json::Value) {
        if let Err(e) = self.journal.lock().await.write_at(Utc::now(), &event) {
            warn!("Alert journal write failed: {}", e);
        }
    }
}

#[async_trait]
impl Notifier for JournalNotifier {
    async fn send(
        &self,
        subscriber: &str,
        place_name: &str,
        score: &AqiScore,
        sample: &PollutantSample,
    ) -> common::Result<()> {
        let failure = |reason: String| Error::NotifierFailure {
            subscriber: subscriber.to_string(),
            reason,
        };
        let notice = AlertNotice::new(subscriber, place_name, score, sample)
            .ok_or_else(|| failure(format!("AQI {} is below every alert tier", score.rounded())))?;

        info!("📣 {} → {}", notice.subject(), notice.subscriber);
        debug!("{}", notice.body());

        let record = AlertRecord {
            ts: now_iso(),
            kind: "alert",
            subject: notice.subject(),
            source: score.source,
            notice: &notice,
        };
        self.journal
            .lock()
            .await
            .write_at(Utc::now(), &record)
            .map_err(|e| failure(e.to_string()))
    }
}
