//! Page Composer - binary entry point
//! Delegates to the library for all app logic.

#[tokio::main]
async fn main() {
    page_composer::run().await;
}
