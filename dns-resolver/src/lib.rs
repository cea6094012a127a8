#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::similar_names)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::wildcard_imports)]

pub mod authoritative;
pub mod cache;
pub mod dispatch;
pub mod error;
pub mod metrics;
pub mod name;
pub mod net;
pub mod recursive;
