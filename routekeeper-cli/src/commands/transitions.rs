//! Delivery lifecycle table.

use routekeeper::delivery::{DeliveryStatus, TRANSITIONS};

use crate::error::CliError;

/// One line per status with the status it can move to.
pub fn render() -> Vec<String> {
    DeliveryStatus::ALL
        .iter()
        .map(|status| match status.allowed_successor() {
            Some(next) => format!("{:<20} -> {}", status.as_str(), next.as_str()),
            None => format!("{:<20}    (terminal)", status.as_str()),
        })
        .collect()
}

/// Run the transitions command.
pub fn run() -> Result<(), CliError> {
    println!("Delivery status transitions ({} allowed)", TRANSITIONS.len());
    println!();
    for line in render() {
        println!("  {}", line);
    }
    Ok(())
}
