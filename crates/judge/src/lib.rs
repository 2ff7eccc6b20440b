//! LLM judge integration for quillgrade.
//!
//! A [`JudgeClient`] sends chat messages to a model and returns its raw
//! reply. [`Judge`] wraps a client with bounded concurrency, retries and
//! tolerant JSON extraction ([`parse_judge_response`]).

#![warn(missing_docs)]

pub mod client;
pub mod judge;
pub mod parse;

pub use client::{ChatMessage, JudgeClient, JudgeConfig, JudgeError, OpenAiJudgeClient, Result};
pub use judge::Judge;
pub use parse::parse_judge_response;
