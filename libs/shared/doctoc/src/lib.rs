pub mod client;

pub use client::DoctocClient;
