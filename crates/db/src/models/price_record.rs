use chrono::{DateTime, TimeZone, Utc};

/// One ingested price observation.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceRecord {
    pub id: i64,
    pub symbol: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

#[derive(Debug, Clone)]
pub struct NewPriceRecord {
    pub symbol: String,
    pub price: f64,
    pub timestamp: DateTime<Utc>,
    pub source: String,
}

impl NewPriceRecord {
    pub fn new(symbol: impl Into<String>, price: f64, source: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            price,
            timestamp: Utc::now(),
            source: source.into(),
        }
    }
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PriceRecordRow {
    pub id: i64,
    pub symbol: String,
    pub price: f64,
    pub timestamp: i64,
    pub source: String,
}

impl PriceRecordRow {
    pub fn into_domain(self) -> PriceRecord {
        PriceRecord {
            id: self.id,
            symbol: self.symbol,
            price: self.price,
            timestamp: timestamp_to_datetime(self.timestamp),
            source: self.source,
        }
    }
}

fn timestamp_to_datetime(ts: i64) -> DateTime<Utc> {
    Utc.timestamp_opt(ts, 0).single().unwrap_or_default()
}
