//! `homeclaw onboard`: first-time setup wizard.
//!
//! Creates `~/.homeclaw/config.json` (an existing one is kept), asks for the
//! provider API key when the chosen model needs one and stores it in
//! `~/.homeclaw/.env`, and creates the workspace files.

use homeclaw_config::{AppConfig, Credentials, ProviderDef, catalog, find_provider};
use std::io::{BufRead, Write};
use std::path::{Path, PathBuf};

/// Flags given on the command line; anything missing is asked for.
#[derive(Debug, Default, Clone)]
pub struct OnboardOptions {
    pub provider: Option<String>,
    pub model: Option<String>,
    pub api_key: Option<String>,
}

/// What onboarding did, for the summary and for tests.
#[derive(Debug, Default)]
pub struct OnboardReport {
    pub config_created: bool,
    pub default_model: String,
    pub key_stored: Option<String>,
    pub workspace_dir: PathBuf,
    pub files_created: usize,
}

pub fn run(options: OnboardOptions) -> Result<(), Box<dyn std::error::Error>> {
    let stdin = std::io::stdin();
    let mut input = stdin.lock();
    let mut output = std::io::stdout();

    writeln!(output, "HomeClaw — first-time setup")?;
    writeln!(output, "===========================\n")?;

    let report = run_with(
        &options,
        &AppConfig::config_path(),
        &AppConfig::credentials_path(),
        &mut input,
        &mut output,
    )?;

    writeln!(output)?;
    writeln!(output, "Default model: {}", report.default_model)?;
    writeln!(output, "Workspace:     {}", report.workspace_dir.display())?;
    writeln!(output, "\nSetup complete. Run `homeclaw` to start chatting.")?;
    Ok(())
}

/// The wizard against explicit paths and streams.
pub fn run_with(
    options: &OnboardOptions,
    config_path: &Path,
    credentials_path: &Path,
    input: &mut dyn BufRead,
    output: &mut dyn Write,
) -> Result<OnboardReport, Box<dyn std::error::Error>> {
    let config_dir = config_path.parent().unwrap_or(Path::new("."));
    std::fs::create_dir_all(config_dir)?;

    let mut report = OnboardReport::default();

    let config = if config_path.exists() {
        writeln!(output, "Config already exists at {} (kept).", config_path.display())?;
        AppConfig::load_from(config_path)?
    } else {
        let provider = match options.provider.as_deref() {
            Some(key) => find_provider(key).ok_or_else(|| {
                let known: Vec<&str> = catalog().iter().map(|p| p.key).collect();
                format!("unknown provider '{key}' (known: {})", known.join(", "))
            })?,
            None => choose_provider(input, output)?,
        };
        let model = match options.model.clone() {
            Some(model) => model,
            None => choose_model(provider, input, output)?,
        };

        let config = AppConfig {
            default_model: format!("{}:{}", provider.key, model),
            workspace: workspace_setting(config_dir),
            ..AppConfig::default()
        };
        config.save_to(config_path)?;
        writeln!(output, "Created {}", config_path.display())?;
        report.config_created = true;
        config
    };
    report.default_model = config.default_model.clone();

    let selection = config.resolve_model(&config.default_model)?;
    if let Some(env_var) = selection.api_key_env {
        let existing = Credentials::load(credentials_path)?;
        let key = match options.api_key.clone() {
            Some(key) => Some(key),
            None if existing.contains(&env_var) => None,
            None => prompt(input, output, &format!("API key for {} ({env_var}, blank to skip): ", selection.provider))?
                .filter(|k| !k.is_empty()),
        };

        match key {
            Some(key) => {
                Credentials::set(credentials_path, &env_var, key.trim())?;
                writeln!(output, "Stored {env_var} in {}", credentials_path.display())?;
                report.key_stored = Some(env_var);
            }
            None if existing.contains(&env_var) => {
                writeln!(output, "{env_var} is already set.")?;
            }
            None => {
                writeln!(
                    output,
                    "No key stored. Add {env_var}=... to {} before chatting.",
                    credentials_path.display()
                )?;
            }
        }
    }

    report.workspace_dir = config.workspace_path();
    let created = homeclaw_workspace::ensure(&report.workspace_dir)?;
    for path in &created {
        writeln!(output, "Created {}", path.display())?;
    }
    report.files_created = created.len();

    Ok(report)
}

/// Keep the portable `~` form for the default location.
fn workspace_setting(config_dir: &Path) -> String {
    if config_dir == AppConfig::config_dir() {
        AppConfig::default().workspace
    } else {
        config_dir.join("workspace").display().to_string()
    }
}

fn prompt(input: &mut dyn BufRead, output: &mut dyn Write, question: &str) -> std::io::Result<Option<String>> {
    write!(output, "{question}")?;
    output.flush()?;
    let mut line = String::new();
    if input.read_line(&mut line)? == 0 {
        return Ok(None);
    }
    Ok(Some(line.trim().to_string()))
}

/// Numbered menu; blank or EOF picks the first entry.
fn choose(
    input: &mut dyn BufRead,
    output: &mut dyn Write,
    title: &str,
    options: &[String],
) -> Result<usize, Box<dyn std::error::Error>> {
    writeln!(output, "{title}")?;
    for (i, label) in options.iter().enumerate() {
        writeln!(output, "  {}. {label}", i + 1)?;
    }
    loop {
        let answer = prompt(input, output, &format!("Choose [1-{}] (default 1): ", options.len()))?;
        let Some(answer) = answer.filter(|a| !a.is_empty()) else {
            return Ok(0);
        };
        match answer.parse::<usize>() {
            Ok(n) if (1..=options.len()).contains(&n) => return Ok(n - 1),
            _ => writeln!(output, "Please enter a number between 1 and {}.", options.len())?,
        }
    }
}

fn choose_provider(
    input: &mut dyn BufRead,
    output: &mut dyn Write,
) -> Result<&'static ProviderDef, Box<dyn std::error::Error>> {
    let providers = catalog();
    let labels: Vec<String> = providers
        .iter()
        .map(|p| format!("{} ({})", p.display_name, p.key))
        .collect();
    let idx = choose(input, output, "Which LLM provider?", &labels)?;
    Ok(&providers[idx])
}

fn choose_model(
    provider: &ProviderDef,
    input: &mut dyn BufRead,
    output: &mut dyn Write,
) -> Result<String, Box<dyn std::error::Error>> {
    let labels: Vec<String> = provider
        .models
        .iter()
        .map(|(id, name)| format!("{name} ({id})"))
        .collect();
    let idx = choose(input, output, "Which model?", &labels)?;
    Ok(provider.models[idx].0.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths(dir: &Path) -> (PathBuf, PathBuf) {
        (dir.join("home").join("config.json"), dir.join("home").join(".env"))
    }

    #[test]
    fn interactive_setup_writes_config_key_and_workspace() {
        let dir = tempfile::tempdir().unwrap();
        let (config_path, creds_path) = paths(dir.path());
        // Anthropic (2nd), second model, then the key
        let mut input = &b"2\n2\nsk-ant-test\n"[..];
        let mut output = Vec::new();

        let report = run_with(&OnboardOptions::default(), &config_path, &creds_path, &mut input, &mut output).unwrap();

        assert!(report.config_created);
        assert_eq!(report.default_model, "anthropic:claude-haiku-4-5-20251001");
        assert_eq!(report.key_stored.as_deref(), Some("ANTHROPIC_API_KEY"));
        assert_eq!(report.files_created, 5);

        let config = AppConfig::load_from(&config_path).unwrap();
        assert_eq!(config.default_model, report.default_model);
        let creds = Credentials::load(&creds_path).unwrap();
        assert_eq!(creds.get("ANTHROPIC_API_KEY").as_deref(), Some("sk-ant-test"));

        // The key is never echoed back
        let shown = String::from_utf8(output).unwrap();
        assert!(!shown.contains("sk-ant-test"));
    }

    #[test]
    fn flags_skip_the_questions() {
        let dir = tempfile::tempdir().unwrap();
        let (config_path, creds_path) = paths(dir.path());
        let options = OnboardOptions {
            provider: Some("openai".into()),
            model: Some("gpt-4o-mini".into()),
            api_key: Some("sk-flag".into()),
        };
        let mut input = &b""[..];

        let report = run_with(&options, &config_path, &creds_path, &mut input, &mut Vec::new()).unwrap();
        assert_eq!(report.default_model, "openai:gpt-4o-mini");
        assert_eq!(
            Credentials::load(&creds_path).unwrap().get("OPENAI_API_KEY").as_deref(),
            Some("sk-flag")
        );
    }

    #[test]
    fn existing_config_is_kept() {
        let dir = tempfile::tempdir().unwrap();
        let (config_path, creds_path) = paths(dir.path());
        let existing = AppConfig {
            default_model: "local-llama".into(),
            workspace: dir.path().join("ws").display().to_string(),
            ..AppConfig::default()
        };
        existing.save_to(&config_path).unwrap();

        let options = OnboardOptions {
            provider: Some("openai".into()),
            ..OnboardOptions::default()
        };
        let report = run_with(&options, &config_path, &creds_path, &mut &b""[..], &mut Vec::new()).unwrap();

        assert!(!report.config_created);
        assert_eq!(AppConfig::load_from(&config_path).unwrap(), existing);
        // Ollama needs no key
        assert!(report.key_stored.is_none());
        assert!(!creds_path.exists());

        // A second run creates no workspace files
        let again = run_with(&options, &config_path, &creds_path, &mut &b""[..], &mut Vec::new()).unwrap();
        assert_eq!(again.files_created, 0);
    }

    #[test]
    fn unknown_provider_flag_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let (config_path, creds_path) = paths(dir.path());
        let options = OnboardOptions {
            provider: Some("nope".into()),
            ..OnboardOptions::default()
        };
        let err = run_with(&options, &config_path, &creds_path, &mut &b""[..], &mut Vec::new()).unwrap_err();
        assert!(err.to_string().contains("unknown provider"));
        assert!(!config_path.exists());
    }

    #[test]
    fn menu_retries_on_bad_input() {
        let mut input = &b"9\nabc\n3\n"[..];
        let mut output = Vec::new();
        let labels = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        assert_eq!(choose(&mut input, &mut output, "Pick", &labels).unwrap(), 2);
    }
}
