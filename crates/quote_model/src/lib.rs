use serde::{Deserialize, Serialize};

/// USD-BRL quote as published by awesomeapi. Every field is kept as text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Quote {
    pub code: String,
    pub codein: String,
    pub name: String,
    pub high: String,
    pub low: String,
    #[serde(rename = "varBid")]
    pub var_bid: String,
    #[serde(rename = "pctChange")]
    pub pct_change: String,
    pub bid: String,
    pub ask: String,
    pub timestamp: String,
    pub create_date: String,
}

/// `{"USDBRL": {...}}`, shared by the provider and the relay server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuoteEnvelope {
    #[serde(rename = "USDBRL")]
    pub usdbrl: Quote,
}

impl From<Quote> for QuoteEnvelope {
    fn from(quote: Quote) -> Self {
        QuoteEnvelope { usdbrl: quote }
    }
}

/// A quote together with the id the store assigned to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredQuote {
    pub id: i64,
    pub quote: Quote,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BidView {
    pub bid: String,
}

impl BidView {
    pub fn to_line(&self) -> String {
        format!("Dólar: {}", self.bid)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BidEnvelope {
    #[serde(rename = "USDBRL")]
    pub usdbrl: BidView,
}
