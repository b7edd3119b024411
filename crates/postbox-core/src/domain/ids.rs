//! Domain identifiers.
//!
//! `emails.id` は store 側（SERIAL）で採番されるので、ここでは newtype で包むだけ。
//! 生の i64 と混同しないように型を分けている。

use serde::{Deserialize, Serialize};
use std::fmt;

/// Identifier of a row in the `emails` table.
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(i64);

impl MessageId {
    pub fn new(value: i64) -> Self {
        Self(value)
    }

    pub fn get(&self) -> i64 {
        self.0
    }
}

impl From<i64> for MessageId {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl From<i32> for MessageId {
    fn from(value: i32) -> Self {
        Self(i64::from(value))
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "message-{}", self.0)
    }
}
