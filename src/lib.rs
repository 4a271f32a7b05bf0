//! Packs clinical-trial tables, listings and figures into one navigable PDF.
//!
//! A run discovers RTF, DOCX and PDF outputs in a folder, extracts their titles into a
//! [`Manifest`](manifest::Manifest), converts the non-PDF files, lays out a table of contents whose
//! page numbers account for its own length, and writes a single PDF with an outline and clickable
//! TOC lines. See [`pipeline::Packager`] for the entry point.

pub mod bookmarks;
pub mod config;
pub mod convert;
pub mod discovery;
pub mod error;
pub mod export;
pub mod extract;
pub mod fonts;
pub mod layout;
pub mod manifest;
pub mod merge;
pub mod model;
pub mod pages;
pub mod pipeline;
pub mod runlog;
pub mod toc;
pub mod watch;

pub use error::{Error, Result};
