//! `mailmate init`: Write a default config file.

use mailmate_config::AppConfig;

pub fn run() -> anyhow::Result<()> {
    let config_path = AppConfig::config_path();

    println!("✉️  MailMate First-Time Setup");
    println!("==============================\n");

    if let Some(dir) = config_path.parent()
        && !dir.exists()
    {
        std::fs::create_dir_all(dir)?;
        println!("✅ Created config directory: {}", dir.display());
    }

    if config_path.exists() {
        println!("⚠️  Config already exists at: {}", config_path.display());
        println!("   Edit it manually or delete and re-run init.\n");
        return Ok(());
    }

    std::fs::write(&config_path, AppConfig::default_toml())?;
    println!("✅ Created config.toml at: {}", config_path.display());
    println!("\n📝 Next steps:");
    println!("   1. Set MAILMATE_API_KEY (or add api_key to the config file)");
    println!("   2. Run `mailmate doctor` to check the setup");
    println!("   3. Run `mailmate serve` or `mailmate ask \"Fix my email: ...\"`");

    Ok(())
}
