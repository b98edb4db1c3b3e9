use chrono::Duration;
use page_composer::routes::auth::{create_access_token, DEFAULT_TOKEN_EXPIRY_HOURS};
use std::env;

fn main() {
    dotenvy::dotenv().ok();

    let email = env::args().nth(1).unwrap_or_else(|| {
        eprintln!("Usage: cargo run --bin issue-token <EMAIL> [ROLE] [HOURS]");
        std::process::exit(1);
    });
    let role = env::args().nth(2).unwrap_or_else(|| "editor".to_string());
    let hours: i64 = env::args()
        .nth(3)
        .and_then(|s| s.parse().ok())
        .unwrap_or(DEFAULT_TOKEN_EXPIRY_HOURS);

    match create_access_token(&email, &email, &role, Duration::hours(hours)) {
        Ok(token) => {
            println!("\nOperator : {}", email);
            println!("Role     : {}", role);
            println!("Expires  : in {} hours\n", hours);
            println!("# Paste this into the dashboard's .env:");
            println!("CMS_API_TOKEN={}", token);
        }
        Err(e) => {
            eprintln!("Error issuing token: {}", e);
            std::process::exit(1);
        }
    }
}
