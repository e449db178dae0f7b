//! **deskplan**: declarative window layouts for multi-monitor X11 desktops.
//!
//! A layout file lists windows, each with a target monitor, an inset
//! position, a way to recognise the window and a command that opens it.
//! Applying the layout finds every window (launching it if needed and
//! waiting for it to show up) and moves it into place.
//!
//! # Architecture
//!
//! The crate is organised around two core traits:
//!
//! * [`traits::WindowManager`] abstracts monitor and window listing plus
//!   window placement, so layout logic is not tied to any window manager.
//! * [`traits::ProcessHost`] abstracts process snapshots, shell commands and
//!   detached launches.
//!
//! On top of these, [`process`] and [`query`] build and search the process
//! tree, [`expr`] evaluates the conditions layout files carry, [`geometry`]
//! turns positions into rectangles, [`locator`] finds windows and
//! [`layout`] ties it together.  The concrete backend lives in [`x11`].

pub mod config;
pub mod expr;
pub mod geometry;
pub mod layout;
pub mod locator;
pub mod model;
pub mod process;
pub mod query;
pub mod retry;
pub mod shortcut;
pub mod traits;
pub mod x11;
