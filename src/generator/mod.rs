//! Derived outputs written next to the rendered pages.

pub mod feed;
