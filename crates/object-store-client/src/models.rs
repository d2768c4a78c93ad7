//! Object listing models

/// One page of an object listing
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ObjectPage {
    /// Keys in this page, in listing order
    pub keys: Vec<String>,
    /// Whether more pages follow
    pub is_truncated: bool,
    /// Cursor for the next page, when the store returned one
    pub next_cursor: Option<String>,
}

impl ObjectPage {
    pub fn new(keys: Vec<String>, is_truncated: bool, next_cursor: Option<String>) -> Self {
        Self {
            keys,
            is_truncated,
            next_cursor,
        }
    }

    /// Final page of a listing
    pub fn last(keys: Vec<String>) -> Self {
        Self::new(keys, false, None)
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}
