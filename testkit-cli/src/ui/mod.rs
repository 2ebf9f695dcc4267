//! Terminal output for testkit commands

use colored::Colorize;
use lnpbp_testkit::PaymentReceipt;

/// Step finished
pub fn done(message: &str) {
    println!("{} {}", "✓".green().bold(), message);
}

/// Step finished without the expected outcome
pub fn failed(message: &str) {
    eprintln!("{} {}", "✗".red().bold(), message);
}

/// Step in progress
pub fn step(message: &str) {
    println!("{} {}", "→".blue().bold(), message);
}

/// Section title
pub fn section(title: &str) {
    println!("\n{}", title.bold().underline());
}

/// Indented `label: value` line
pub fn field(label: &str, value: impl std::fmt::Display) {
    println!("  {}: {}", label.cyan(), value);
}

/// Outcome of an automatic payment.
pub fn receipt(receipt: &PaymentReceipt) {
    match receipt {
        PaymentReceipt::Chain { txid } => {
            done("Payment confirmed on chain");
            field("Transaction", txid);
        }
        PaymentReceipt::Lightning {
            payment_hash,
            amount_msat,
        } => {
            done("Invoice paid");
            field("Payment hash", payment_hash);
            field("Amount", format!("{} msat", amount_msat));
        }
    }
}

/// Hashes of freshly mined blocks, as a JSON array.
pub fn block_hashes(hashes: &[String]) {
    if let Ok(pretty) = serde_json::to_string_pretty(hashes) {
        println!("{}", pretty);
    }
}
