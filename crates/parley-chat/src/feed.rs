//! Day-bucketed presentation of a channel's messages.

use std::collections::HashMap;
use std::fmt;

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use tracing::warn;

use parley_types::models::Message;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BucketLabel {
    Today,
    Yesterday,
    Date(NaiveDate),
}

impl fmt::Display for BucketLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Today => f.write_str("Today"),
            Self::Yesterday => f.write_str("Yesterday"),
            // e.g. "February 10, 2025"
            Self::Date(date) => write!(f, "{}", date.format("%B %d, %Y")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub label: BucketLabel,
    pub messages: Vec<Message>,
}

/// Group messages by calendar day in `zone`, relative to `now`.
///
/// Messages are taken in the order given, which should be the store's
/// delivery order; nothing is re-sorted. A bucket is opened the first time
/// its label is seen and later messages with the same label join it, so a
/// message with an older timestamp arriving late lands in an earlier bucket
/// and headers can appear out of chronological order.
pub fn assemble<Tz: TimeZone>(
    messages: impl IntoIterator<Item = Message>,
    now: DateTime<Utc>,
    zone: &Tz,
) -> Vec<Bucket> {
    let today = now.with_timezone(zone).date_naive();
    let yesterday = today.pred_opt();

    let mut buckets: Vec<Bucket> = Vec::new();
    let mut index: HashMap<BucketLabel, usize> = HashMap::new();

    for msg in messages {
        let date = local_date(&msg, zone);
        let label = if date == today {
            BucketLabel::Today
        } else if Some(date) == yesterday {
            BucketLabel::Yesterday
        } else {
            BucketLabel::Date(date)
        };

        match index.get(&label) {
            Some(&i) => buckets[i].messages.push(msg),
            None => {
                index.insert(label.clone(), buckets.len());
                buckets.push(Bucket {
                    label,
                    messages: vec![msg],
                });
            }
        }
    }

    buckets
}

fn local_date<Tz: TimeZone>(msg: &Message, zone: &Tz) -> NaiveDate {
    let instant = msg.sent_at().unwrap_or_else(|| {
        warn!("Out-of-range timestamp {} on message '{}'", msg.timestamp, msg.id);
        DateTime::default()
    });
    instant.with_timezone(zone).date_naive()
}

/// The current feed of one channel. Each snapshot replaces the view
/// wholesale; nothing is carried over from the previous one.
pub struct FeedView<Tz: TimeZone> {
    zone: Tz,
    buckets: Vec<Bucket>,
}

impl<Tz: TimeZone> FeedView<Tz> {
    pub fn new(zone: Tz) -> Self {
        Self {
            zone,
            buckets: Vec::new(),
        }
    }

    pub fn replace(&mut self, messages: Vec<Message>, now: DateTime<Utc>) {
        self.buckets = assemble(messages, now, &self.zone);
    }

    pub fn buckets(&self) -> &[Bucket] {
        &self.buckets
    }

    /// Total number of messages across all buckets.
    pub fn message_count(&self) -> usize {
        self.buckets.iter().map(|b| b.messages.len()).sum()
    }
}
