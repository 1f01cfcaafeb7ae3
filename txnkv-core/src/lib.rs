//! Core types shared by the txnkv transaction layer and the clusters it talks to.

#![cfg_attr(docsrs, feature(doc_cfg))]

mod error;
mod facade;
mod key;
mod maybe;
mod mutation;
mod range;
mod timestamp;

pub use error::ClusterError;
pub use facade::ClusterFacade;
pub use key::{Key, KvPair, Value};
pub use maybe::{MaybeSend, MaybeSendFuture, MaybeSync};
pub use mutation::{LockInfo, LockKind, Mutation, Op};
pub use range::{BoundKind, BoundRange};
pub use timestamp::Timestamp;
