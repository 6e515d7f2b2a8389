// Cursor codec - opaque pagination cursors over a composite sort key.

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;

use crate::error::{AppError, AppResult};

/// Composite sort key that totally orders a paginated sequence.
///
/// `primary` is the value of the sort column (creation time in millis,
/// star count, rank index); `id` is the unique tie-break so two rows
/// with the same primary value still have a strict deterministic
/// order. The encoded form is opaque to callers: no ordering guarantee
/// is made about the string itself, only that decode(encode(k)) == k.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub primary: i64,
    pub id: String,
}

impl SortKey {
    pub fn new(primary: i64, id: impl Into<String>) -> Self {
        SortKey {
            primary,
            id: id.into(),
        }
    }

    pub fn encode(&self) -> String {
        URL_SAFE_NO_PAD.encode(format!("{}:{}", self.primary, self.id))
    }

    pub fn decode(cursor: &str) -> AppResult<Self> {
        let malformed = || AppError::MalformedCursor(cursor.to_string());

        let bytes = URL_SAFE_NO_PAD.decode(cursor).map_err(|_| malformed())?;
        let raw = String::from_utf8(bytes).map_err(|_| malformed())?;
        let (primary, id) = raw.split_once(':').ok_or_else(malformed)?;
        if id.is_empty() {
            return Err(malformed());
        }
        let primary = primary.parse::<i64>().map_err(|_| malformed())?;

        Ok(SortKey {
            primary,
            id: id.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips() {
        let keys = [
            SortKey::new(0, "a"),
            SortKey::new(-42, "post:with:colons"),
            SortKey::new(i64::MAX, "ffffffff-1111-2222-3333-444444444444"),
            SortKey::new(i64::MIN, "äöü"),
        ];
        for key in keys {
            assert_eq!(SortKey::decode(&key.encode()).unwrap(), key);
        }
    }

    #[test]
    fn rejects_garbage() {
        for cursor in ["", "not base64!!", "bm9jb2xvbg", "OmVtcHR5cHJpbWFyeQ"] {
            let err = SortKey::decode(cursor).unwrap_err();
            assert!(matches!(err, AppError::MalformedCursor(_)));
        }
    }

    #[test]
    fn rejects_non_numeric_primary() {
        let cursor = URL_SAFE_NO_PAD.encode("abc:id");
        assert!(matches!(
            SortKey::decode(&cursor),
            Err(AppError::MalformedCursor(_))
        ));
    }

    #[test]
    fn rejects_missing_id() {
        let cursor = URL_SAFE_NO_PAD.encode("17:");
        assert!(matches!(
            SortKey::decode(&cursor),
            Err(AppError::MalformedCursor(_))
        ));
    }
}
