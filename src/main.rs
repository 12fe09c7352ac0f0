//! # imshelf CLI
//!
//! Command-line interface for the image library.
//!
//! ## Usage
//! ```bash
//! imshelf init
//! imshelf add scan.png --tag receipts
//! imshelf refresh
//! imshelf search --tag receipts --output json
//! ```

mod cli;

use imshelf::Result;

fn main() -> Result<()> {
    cli::run()
}
