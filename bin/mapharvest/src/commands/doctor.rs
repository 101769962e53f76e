use mapharvest_browser::{find_browser_binary, list_available_browsers, BrowserEngine};
use mapharvest_core::Config;
use std::path::Path;

/// Check the config and the browser runtime before a long crawl.
pub async fn run(config_path: &Path) -> anyhow::Result<()> {
    println!();
    println!("🩺 mapharvest doctor");
    println!("====================");
    println!();

    let mut ok_count = 0u32;
    let mut err_count = 0u32;

    // --- 1. Config ---
    println!("📋 Configuration");
    let config = match Config::load(config_path) {
        Ok(config) => {
            print_ok("Config loads", &config_path.display().to_string());
            ok_count += 1;
            Some(config)
        }
        Err(e) => {
            print_err("Config invalid", &e.to_string());
            err_count += 1;
            None
        }
    };
    if let Some(config) = &config {
        println!(
            "  {} keywords × {} locations",
            config.categories.len(),
            config.target_locations.len()
        );
    }
    println!();

    // --- 2. Browser ---
    println!("🌐 Browser");
    let engine = config
        .as_ref()
        .map(|c| BrowserEngine::parse(&c.browser.engine))
        .unwrap_or(BrowserEngine::Chrome);
    match find_browser_binary(engine) {
        Some(path) => {
            print_ok(&format!("{} found", engine.name()), &path);
            ok_count += 1;
        }
        None => {
            print_err(&format!("{} not found", engine.name()), "Install it or set browser.engine");
            err_count += 1;
        }
    }
    for (other, path) in list_available_browsers() {
        if other != engine {
            println!("  also available: {} ({})", other.name(), path);
        }
    }
    println!();

    println!("{} ok, {} errors", ok_count, err_count);
    if err_count > 0 {
        anyhow::bail!("doctor found {} problem(s)", err_count);
    }
    Ok(())
}

fn print_ok(label: &str, detail: &str) {
    if detail.is_empty() {
        println!("  ✅ {}", label);
    } else {
        println!("  ✅ {} — {}", label, detail);
    }
}

fn print_err(label: &str, hint: &str) {
    if hint.is_empty() {
        println!("  ❌ {}", label);
    } else {
        println!("  ❌ {} — {}", label, hint);
    }
}
