//! Password hashing utility for SupportDesk staff accounts
//!
//! Usage:
//!   cargo run --bin hash-password
//!   cargo run --bin hash-password "MySecurePassword123!"
//!
//! The printed Argon2id hash goes into `agents.password_hash`.

use std::env;
use std::io::{self, Write};

use supportdesk_api::auth::hash_password;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let password = if let Some(pwd) = env::args().nth(1) {
        pwd
    } else {
        // Read from stdin so the password stays out of the process list
        print!("Enter password to hash: ");
        io::stdout().flush()?;

        let mut password = String::new();
        io::stdin().read_line(&mut password)?;
        password.trim().to_string()
    };

    if password.len() < 12 {
        eprintln!("Warning: Password is less than 12 characters. Consider using a longer password.");
    }

    let password_hash = hash_password(&password)?;

    println!("{}", password_hash);
    eprintln!("\nExample SQL:");
    eprintln!(
        "UPDATE agents SET password_hash = '{}' WHERE username = 'alice';",
        password_hash
    );

    Ok(())
}
