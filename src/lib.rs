//! # Consult Harness
//!
//! A small backend that bridges a consultation intake form to three hosted
//! services: a generative model (Gemini) that normalizes submissions, a
//! vector database (Weaviate) that stores and retrieves them, and a voice
//! API (Vapi) that places an outbound advisory call seeded with retrieved
//! context.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────┐   ┌─────────────┐   ┌──────────────┐
//! │ Intake form  │──▶│  Normalize   │──▶│   Weaviate    │
//! │ prompt+files │   │  (Gemini)   │   │ store/search │
//! └──────────────┘   └─────────────┘   └──────┬───────┘
//!                                             │
//!                      ┌──────────────────────┤
//!                      ▼                      ▼
//!                 ┌──────────┐          ┌──────────┐
//!                 │ RAG/agent│          │  Voice   │
//!                 │ answers  │          │  (Vapi)  │
//!                 └──────────┘          └──────────┘
//! ```
//!
//! ## Quick Start
//!
//! ```bash
//! consult init                         # ensure the collection exists
//! consult ingest --prompt "..." --pdf deck.pdf
//! consult search "pricing strategy"
//! consult serve                        # start the HTTP server
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration and secret resolution |
//! | [`error`] | Typed service errors |
//! | [`models`] | Core data types |
//! | [`traits`] | Generator, vector store and voice seams |
//! | [`uploads`] | Per-submission upload directories |
//! | [`normalize`] | Normalization prompt and request parts |
//! | [`gemini`] | Gemini `generateContent` client |
//! | [`weaviate`] | Weaviate REST/GraphQL client |
//! | [`vapi`] | Vapi client |
//! | [`ingest`] | Form ingestion pipeline |
//! | [`search`] | Search, RAG and query-agent operations |
//! | [`voice`] | Voice-call handoff |
//! | [`setup`] | One-time voice setup commands |
//! | [`server`] | HTTP server |

pub mod config;
pub mod error;
pub mod gemini;
pub mod ingest;
pub mod models;
pub mod normalize;
pub mod search;
pub mod server;
pub mod setup;
pub mod traits;
pub mod uploads;
pub mod vapi;
pub mod voice;
pub mod weaviate;
