//! Build script for the drip crate.
//!
//! Ensures the crate is recompiled when files in the migrations directory
//! change, which the `SQLx` `migrate!()` macro needs to pick up schema edits.

fn main() {
    println!("cargo:rerun-if-changed=migrations");
}
