//! Console monitor for what is currently playing on Spotify.
//!
//! A [`PollLoop`](poller::PollLoop) polls a
//! [`PlaybackClient`](client::PlaybackClient) and renders changes to a
//! [`Sink`](display::Sink). The binary wires it to the Spotify Web API
//! [`Client`](client::Client) and the terminal
//! [`Console`](display::Console).
#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]

#[macro_use]
extern crate log;

pub mod client;
pub mod config;
pub mod display;
pub mod error;
pub mod http;
pub mod oauth;
pub mod poller;
pub mod protocol;
pub mod secrets;
pub mod signal;
pub mod snapshot;
pub mod util;
