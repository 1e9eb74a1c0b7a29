/*!
 * Queue Types
 * Send modes, limits and inquiry snapshots
 */

use super::pool::MessageCell;
use crate::core::types::{Pid, QueueId, Size};
use crate::sync::WaitOrder;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// How a message is posted
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SendMode {
    /// Append (FIFO)
    #[default]
    Normal,
    /// Prepend (LIFO)
    Urgent,
    /// Hand to every waiting receiver; never queued
    Broadcast,
}

/// Maximum number of pending messages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueLimit {
    /// Arena-backed pool, bounded by bytes only
    #[default]
    Unlimited,
    /// Slotted pool holding at most this many messages
    Messages(usize),
}

impl QueueLimit {
    #[inline]
    pub fn is_reached(&self, pending: usize) -> bool {
        match self {
            Self::Unlimited => false,
            Self::Messages(max) => pending >= *max,
        }
    }
}

impl From<usize> for QueueLimit {
    /// Zero means unlimited
    fn from(limit: usize) -> Self {
        if limit == 0 {
            Self::Unlimited
        } else {
            Self::Messages(limit)
        }
    }
}

/// Queue creation attributes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueAttr {
    /// Registry name; generated when absent
    pub name: Option<String>,
    pub pool_size: Size,
    pub limit: QueueLimit,
    /// Order in which blocked receivers are served
    pub order: WaitOrder,
}

impl QueueAttr {
    pub fn new(pool_size: Size) -> Self {
        Self {
            name: None,
            pool_size,
            limit: QueueLimit::Unlimited,
            order: WaitOrder::Fifo,
        }
    }

    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_limit(mut self, limit: impl Into<QueueLimit>) -> Self {
        self.limit = limit.into();
        self
    }

    pub fn with_order(mut self, order: WaitOrder) -> Self {
        self.order = order;
        self
    }
}

/// Snapshot returned by `inquire`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueInfo {
    pub id: QueueId,
    pub name: String,
    pub waiters: usize,
    pub pending: usize,
    pub order: WaitOrder,
    pub limit: QueueLimit,
    pub pool_size: Size,
    pub used_mem: Size,
}

/// What a blocked receiver asked for
#[derive(Debug, Clone, Copy)]
pub(crate) struct ReadRequest {
    /// Destination size for direct copies; zero for `receive`
    pub capacity: usize,
    pub pid: Pid,
}

/// What a sender hands to a blocked receiver
pub(crate) enum Delivery {
    /// Reference on a pool buffer
    Message(Arc<MessageCell>),
    /// Bytes copied for a local reader, already truncated
    Copied(Vec<u8>),
}
