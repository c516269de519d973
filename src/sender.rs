/// Sender shortcodes of the bank channels recognised out of the box.
pub const DEFAULT_BANK_SENDERS: &[&str] = &["HDFCBK", "ICICIBANK", "SBIINB", "AXISBK", "KOTAK", "YESBANK"];

/// Case-insensitive substring allow-list over sender addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenderClassifier {
    tokens: Vec<String>,
}

impl SenderClassifier {
    pub fn new<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let tokens = tokens
            .into_iter()
            .map(|t| t.as_ref().trim().to_uppercase())
            .filter(|t| !t.is_empty())
            .collect();
        Self { tokens }
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }

    pub fn is_bank_sender(&self, address: &str) -> bool {
        let upper = address.to_uppercase();
        self.tokens.iter().any(|t| upper.contains(t.as_str()))
    }
}

impl Default for SenderClassifier {
    fn default() -> Self {
        Self::new(DEFAULT_BANK_SENDERS)
    }
}
