pub mod ask;
pub mod doctor;
pub mod init;
pub mod serve;

use mailmate_config::AppConfig;

/// Setup instructions shown when no provider key is configured.
pub(crate) fn print_missing_key_help() {
    eprintln!();
    eprintln!("  ERROR: No API key configured!");
    eprintln!();
    eprintln!("  Set one of these environment variables:");
    eprintln!("    MAILMATE_API_KEY=sk-...   (generic)");
    eprintln!("    DEEPSEEK_API_KEY=sk-...   (DeepSeek)");
    eprintln!("    OPENAI_API_KEY=sk-...     (OpenAI-compatible)");
    eprintln!();
    eprintln!("  Or add it to your config file:");
    eprintln!("    {}", AppConfig::config_path().display());
    eprintln!();
}
