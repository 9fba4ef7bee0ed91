#![deny(clippy::pedantic, unsafe_code)]
#![allow(clippy::module_name_repetitions)]

//! HTTP payload acquisition for the bndl bootstrapper
//!
//! A thin client over reqwest with bounded retry and cancel-aware
//! download progress. Payload verification happens above this crate;
//! here a download is just bytes arriving in a file.

mod client;

pub use client::{DownloadProgress, NetClient, NetConfig};
