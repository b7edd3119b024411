//! Errors - エラー型と分類
//!
//! Connection だけが致命的になりうる。それ以外は operation の境界でログに落とし、
//! cycle は次の tick に進む。

use thiserror::Error;

use super::MessageId;

/// ErrorKind は失敗の運用上の分類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// store に到達できない
    Connection,
    /// DDL の失敗（致命的ではない）
    Schema,
    /// 読み取りの失敗
    Query,
    /// mark-sent などの書き込みの失敗（致命的ではない）
    Update,
    /// relay が受け付けなかった
    Delivery,
}

/// Failures raised by a [`MessageStore`](crate::ports::MessageStore).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("store connection failed: {0}")]
    Connection(String),

    #[error("store session is not established")]
    NotConnected,

    #[error("schema statement failed: {0}")]
    Schema(String),

    #[error("query failed: {0}")]
    Query(String),

    #[error("update failed: {0}")]
    Update(String),

    #[error("{0} does not exist")]
    UnknownMessage(MessageId),
}

impl StoreError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            StoreError::Connection(_) | StoreError::NotConnected => ErrorKind::Connection,
            StoreError::Schema(_) => ErrorKind::Schema,
            StoreError::Query(_) => ErrorKind::Query,
            StoreError::Update(_) | StoreError::UnknownMessage(_) => ErrorKind::Update,
        }
    }
}

/// Failures raised by a [`Notifier`](crate::ports::Notifier).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum DeliveryError {
    #[error("invalid address {address:?}: {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("could not compose message: {0}")]
    Compose(String),

    #[error("relay transport failed: {0}")]
    Transport(String),

    #[error("relay rejected message: {0}")]
    Rejected(String),
}

impl DeliveryError {
    pub fn kind(&self) -> ErrorKind {
        ErrorKind::Delivery
    }
}

/// The only errors that stop the process.
#[derive(Debug, Error)]
pub enum FatalError {
    #[error("store unavailable after {attempts} connection attempts: {source}")]
    StoreUnavailable {
        attempts: u32,
        #[source]
        source: StoreError,
    },
}

impl FatalError {
    /// Exit status used when the store cannot be reached.
    pub const STORE_UNAVAILABLE_EXIT_CODE: u8 = 2;

    pub fn exit_code(&self) -> u8 {
        match self {
            FatalError::StoreUnavailable { .. } => Self::STORE_UNAVAILABLE_EXIT_CODE,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::connection(StoreError::Connection("refused".into()), ErrorKind::Connection)]
    #[case::not_connected(StoreError::NotConnected, ErrorKind::Connection)]
    #[case::schema(StoreError::Schema("syntax".into()), ErrorKind::Schema)]
    #[case::query(StoreError::Query("timeout".into()), ErrorKind::Query)]
    #[case::update(StoreError::Update("locked".into()), ErrorKind::Update)]
    #[case::unknown(StoreError::UnknownMessage(MessageId::new(9)), ErrorKind::Update)]
    fn store_error_kinds(#[case] err: StoreError, #[case] kind: ErrorKind) {
        assert_eq!(err.kind(), kind);
    }

    #[test]
    fn fatal_error_has_distinguished_exit_code() {
        let fatal = FatalError::StoreUnavailable {
            attempts: 5,
            source: StoreError::Connection("refused".into()),
        };
        assert_eq!(fatal.exit_code(), 2);
        assert!(fatal.to_string().contains("5 connection attempts"));
    }
}
