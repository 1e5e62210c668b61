use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use lexiboard_contracts::config::{ConfigStore, PosterConfig, ProviderSelection};
use lexiboard_contracts::events::{EventLog, EventPayload};
use lexiboard_contracts::history::{HistoryEntry, HistoryError, HistoryStore};
use lexiboard_contracts::prompt::PosterPrompt;
use lexiboard_contracts::scenes::SceneTable;
use lexiboard_contracts::vocabulary::{join_entry, Category, VocabularyList};
use lexiboard_engine::{
    default_provider_registry, generate_image, output_extension, CancelFlag, GenerateRequest,
    ImageProvider, PollSettings, VocabularyClient,
};
use serde_json::json;

#[derive(Debug, Parser)]
#[command(name = "lexiboard", version, about = "Bilingual vocabulary poster generator")]
struct Cli {
    /// Directory for config, history, and the event log.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate a poster image for a scene and title.
    Generate(GenerateArgs),
    /// Print the vocabulary that would go on a poster.
    Vocab(VocabArgs),
    /// Translate one Chinese word to English.
    Translate(TranslateArgs),
    /// List the built-in scenes.
    Scenes,
    /// Probe the configured image and text endpoints.
    Test,
    /// Manage saved credentials and endpoints.
    Config(ConfigArgs),
    /// Inspect or clear the generation history.
    History(HistoryArgs),
}

#[derive(Debug, Parser)]
struct GenerateArgs {
    #[arg(long)]
    scene: String,
    #[arg(long)]
    title: String,
    /// Output directory for the poster file.
    #[arg(long, default_value = ".")]
    out: PathBuf,
    /// Override the configured image provider for this run.
    #[arg(long)]
    provider: Option<String>,
    /// Load the vocabulary from a JSON file instead of presets or the API.
    #[arg(long)]
    words: Option<PathBuf>,
    #[arg(long, default_value = lexiboard_engine::DEFAULT_ASPECT_RATIO)]
    aspect_ratio: String,
    #[arg(long, default_value = lexiboard_engine::DEFAULT_RESOLUTION)]
    resolution: String,
    #[arg(long, default_value = lexiboard_engine::DEFAULT_OUTPUT_FORMAT)]
    format: String,
    /// Seconds between task status queries.
    #[arg(long, default_value_t = 5)]
    poll_interval: u64,
    /// Status queries before giving up on a task.
    #[arg(long, default_value_t = 60)]
    poll_attempts: u32,
}

#[derive(Debug, Parser)]
struct VocabArgs {
    #[arg(long)]
    scene: String,
    /// Emit the list as JSON instead of readable text.
    #[arg(long)]
    json: bool,
}

#[derive(Debug, Parser)]
struct TranslateArgs {
    word: String,
}

#[derive(Debug, Parser)]
struct ConfigArgs {
    #[command(subcommand)]
    action: ConfigAction,
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    /// Update saved fields; omitted flags keep their current values.
    Set {
        #[arg(long)]
        image_api_key: Option<String>,
        #[arg(long)]
        text_api_url: Option<String>,
        #[arg(long)]
        text_api_key: Option<String>,
        #[arg(long)]
        text_api_model: Option<String>,
        /// `kie` (async task) or `yunwu` (sync direct).
        #[arg(long)]
        provider: Option<String>,
    },
    Show,
    Clear,
}

#[derive(Debug, Parser)]
struct HistoryArgs {
    #[command(subcommand)]
    action: HistoryAction,
}

#[derive(Debug, Subcommand)]
enum HistoryAction {
    List,
    Clear,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("lexiboard error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    let data_dir = resolve_data_dir(cli.data_dir.clone())?;
    match cli.command {
        Command::Generate(args) => run_generate(&data_dir, args),
        Command::Vocab(args) => run_vocab(&data_dir, args),
        Command::Translate(args) => run_translate(&data_dir, args),
        Command::Scenes => run_scenes(),
        Command::Test => run_test(&data_dir),
        Command::Config(args) => run_config(&data_dir, args.action),
        Command::History(args) => run_history(&data_dir, args.action),
    }
}

fn resolve_data_dir(flag: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(dir) = flag {
        return Ok(dir);
    }
    let home = env::var_os("HOME").map(PathBuf::from);
    match home {
        Some(home) => Ok(home.join(".lexiboard")),
        None => bail!("HOME is not set; pass --data-dir"),
    }
}

fn config_store(data_dir: &Path) -> ConfigStore {
    ConfigStore::new(data_dir.join("config.json"))
}

fn history_store(data_dir: &Path) -> HistoryStore {
    HistoryStore::new(data_dir.join("history.json"))
}

fn event_log(data_dir: &Path) -> EventLog {
    EventLog::new(
        data_dir.join("events.jsonl"),
        format!("session-{}", timestamp_millis()),
    )
}

fn load_required_config(data_dir: &Path) -> Result<PosterConfig> {
    let Some(config) = config_store(data_dir).load() else {
        bail!("no configuration saved yet; run `lexiboard config set` first");
    };
    if !config.is_valid() {
        bail!("configuration is incomplete; run `lexiboard config set` with the missing fields");
    }
    Ok(config)
}

fn run_generate(data_dir: &Path, args: GenerateArgs) -> Result<i32> {
    let scene = args.scene.trim().to_string();
    let title = args.title.trim().to_string();
    let config = load_required_config(data_dir)?;
    let provider = match &args.provider {
        Some(raw) => ProviderSelection::parse(raw)
            .with_context(|| format!("unknown provider '{raw}' (expected kie or yunwu)"))?,
        None => config.image_provider,
    };
    let log = event_log(data_dir);

    let vocabulary = resolve_vocabulary(&scene, args.words.as_deref(), &config)?;
    if !PosterPrompt::validate(&scene, &title, &vocabulary) {
        bail!("scene, title, and all three vocabulary categories must be non-empty");
    }
    let prompt = PosterPrompt::build(&scene, &title, &vocabulary);

    let poll = PollSettings {
        interval: Duration::from_secs(args.poll_interval),
        max_attempts: args.poll_attempts,
    };
    let registry = default_provider_registry(poll);
    let request = GenerateRequest {
        prompt,
        api_key: config.image_api_key.clone(),
        aspect_ratio: args.aspect_ratio.clone(),
        resolution: args.resolution.clone(),
        output_format: args.format.clone(),
    };

    log.emit(
        "generation_started",
        payload(json!({
            "scene": scene,
            "title": title,
            "provider": provider.as_str(),
            "words": vocabulary.word_count(),
        })),
    )?;
    println!(
        "generating poster for {scene} via {} ({} words)...",
        provider.as_str(),
        vocabulary.word_count()
    );

    let cancel = CancelFlag::new();
    let image = match generate_image(&registry, provider.as_str(), &request, &cancel) {
        Ok(image) => image,
        Err(err) => {
            log.emit(
                "generation_failed",
                payload(json!({
                    "scene": scene,
                    "title": title,
                    "provider": provider.as_str(),
                    "error": err.to_string(),
                })),
            )?;
            return Err(err.into());
        }
    };

    let image_path = save_image(&args.out, &scene, &image, &args.format)?;
    log.emit(
        "image_generated",
        payload(json!({
            "scene": scene,
            "path": image_path.display().to_string(),
            "provider": image.provider.as_str(),
        })),
    )?;

    let entry = HistoryEntry::new(&scene, &title, vocabulary, provider.as_str());
    record_history_with_recovery(&history_store(data_dir), entry, &log)?;

    println!("poster written to {}", image_path.display());
    Ok(0)
}

/// Overwriting history must survive a full store: on a quota failure the
/// history is cleared and the write retried once; a second failure surfaces
/// and leaves the history empty.
fn record_history_with_recovery(
    store: &HistoryStore,
    entry: HistoryEntry,
    log: &EventLog,
) -> Result<()> {
    match store.record(entry.clone()) {
        Ok(()) => {}
        Err(HistoryError::QuotaExceeded { .. }) => {
            store.clear().context("failed clearing over-quota history")?;
            store
                .record(entry)
                .context("history write failed even after clearing")?;
        }
        Err(err) => return Err(err).context("failed recording history"),
    }
    log.emit("history_recorded", EventPayload::new())?;
    Ok(())
}

fn resolve_vocabulary(
    scene: &str,
    words_file: Option<&std::path::Path>,
    config: &PosterConfig,
) -> Result<VocabularyList> {
    if let Some(path) = words_file {
        let raw = fs::read_to_string(path)
            .with_context(|| format!("failed reading {}", path.display()))?;
        let mut list: VocabularyList = serde_json::from_str(&raw)
            .with_context(|| format!("{} is not a vocabulary file", path.display()))?;
        list.normalize();
        return Ok(list);
    }
    let table = SceneTable::builtin();
    if let Some(preset) = table.get(scene) {
        return Ok(preset.clone());
    }
    let client = VocabularyClient::new(
        &config.text_api_url,
        &config.text_api_key,
        &config.text_api_model,
    );
    Ok(client.generate_vocabulary(scene)?)
}

fn save_image(
    out_dir: &Path,
    scene: &str,
    image: &lexiboard_engine::GeneratedImage,
    requested_format: &str,
) -> Result<PathBuf> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("failed to create {}", out_dir.display()))?;
    let ext = output_extension(image.mime_type.as_deref(), requested_format);
    let path = out_dir.join(format!(
        "poster_{}_{}.{ext}",
        filename_component(scene),
        timestamp_millis()
    ));
    let bytes = image.decode_bytes()?;
    fs::write(&path, bytes).with_context(|| format!("failed to write {}", path.display()))?;
    Ok(path)
}

fn run_vocab(data_dir: &Path, args: VocabArgs) -> Result<i32> {
    let scene = args.scene.trim().to_string();
    let table = SceneTable::builtin();
    let vocabulary = match table.get(&scene) {
        Some(preset) => preset.clone(),
        None => {
            let config = load_required_config(data_dir)?;
            let client = VocabularyClient::new(
                &config.text_api_url,
                &config.text_api_key,
                &config.text_api_model,
            );
            client.generate_vocabulary(&scene)?
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&vocabulary)?);
        return Ok(0);
    }
    for category in Category::ALL {
        println!("{} ({}):", category.label(), category.heading());
        for entry in vocabulary.category(category) {
            println!("  {entry}");
        }
    }
    Ok(0)
}

fn run_translate(data_dir: &Path, args: TranslateArgs) -> Result<i32> {
    let config = load_required_config(data_dir)?;
    let client = VocabularyClient::new(
        &config.text_api_url,
        &config.text_api_key,
        &config.text_api_model,
    );
    let english = client.translate_word(args.word.trim())?;
    println!("{}", join_entry(&english, args.word.trim()));
    Ok(0)
}

fn run_scenes() -> Result<i32> {
    let table = SceneTable::builtin();
    for name in table.names() {
        println!("{name}");
    }
    Ok(0)
}

fn run_test(data_dir: &Path) -> Result<i32> {
    let config = load_required_config(data_dir)?;
    let registry = default_provider_registry(PollSettings::default());
    let mut failed = false;

    let provider_name = config.image_provider.as_str();
    let provider = registry
        .get(provider_name)
        .with_context(|| format!("provider '{provider_name}' is not registered"))?;
    match provider.probe(&config.image_api_key) {
        Ok(()) => println!("image provider {provider_name}: ok"),
        Err(err) => {
            failed = true;
            println!("image provider {provider_name}: failed ({err})");
        }
    }

    let client = VocabularyClient::new(
        &config.text_api_url,
        &config.text_api_key,
        &config.text_api_model,
    );
    match client.probe() {
        Ok(()) => println!("text api: ok"),
        Err(err) => {
            failed = true;
            println!("text api: failed ({err})");
        }
    }

    Ok(if failed { 1 } else { 0 })
}

fn run_config(data_dir: &Path, action: ConfigAction) -> Result<i32> {
    let store = config_store(data_dir);
    match action {
        ConfigAction::Set {
            image_api_key,
            text_api_url,
            text_api_key,
            text_api_model,
            provider,
        } => {
            let mut config = store.load().unwrap_or_default();
            if let Some(value) = image_api_key {
                config.image_api_key = value.trim().to_string();
            }
            if let Some(value) = text_api_url {
                config.text_api_url = value.trim().to_string();
            }
            if let Some(value) = text_api_key {
                config.text_api_key = value.trim().to_string();
            }
            if let Some(value) = text_api_model {
                config.text_api_model = value.trim().to_string();
            }
            if let Some(raw) = provider {
                config.image_provider = ProviderSelection::parse(&raw)
                    .with_context(|| format!("unknown provider '{raw}' (expected kie or yunwu)"))?;
            }
            store.save(&config)?;
            if config.is_valid() {
                println!("configuration saved");
            } else {
                println!("configuration saved (still incomplete)");
            }
            Ok(0)
        }
        ConfigAction::Show => {
            let Some(config) = store.load() else {
                println!("no configuration saved");
                return Ok(0);
            };
            println!("image provider: {}", config.image_provider.as_str());
            println!("image api key:  {}", mask_secret(&config.image_api_key));
            println!("text api url:   {}", config.text_api_url);
            println!("text api key:   {}", mask_secret(&config.text_api_key));
            println!("text api model: {}", config.text_api_model);
            Ok(0)
        }
        ConfigAction::Clear => {
            store.clear()?;
            println!("configuration cleared");
            Ok(0)
        }
    }
}

fn run_history(data_dir: &Path, action: HistoryAction) -> Result<i32> {
    let store = history_store(data_dir);
    match action {
        HistoryAction::List => {
            let entries = store.entries();
            if entries.is_empty() {
                println!("history is empty");
                return Ok(0);
            }
            for entry in entries {
                println!(
                    "{}  {} 《{}》 via {} ({} words)",
                    entry.timestamp,
                    entry.scene,
                    entry.title,
                    entry.provider_used,
                    entry.vocabulary.word_count()
                );
            }
            Ok(0)
        }
        HistoryAction::Clear => {
            store.clear().context("failed clearing history")?;
            println!("history cleared");
            Ok(0)
        }
    }
}

fn payload(value: serde_json::Value) -> EventPayload {
    value.as_object().cloned().unwrap_or_default()
}

fn mask_secret(value: &str) -> String {
    if value.is_empty() {
        return "(unset)".to_string();
    }
    let visible: String = value.chars().take(4).collect();
    format!("{visible}…")
}

fn filename_component(value: &str) -> String {
    value
        .chars()
        .map(|ch| {
            if ch.is_whitespace() || ch == '/' || ch == '\\' {
                '_'
            } else {
                ch
            }
        })
        .collect()
}

fn timestamp_millis() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_millis())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use lexiboard_contracts::history::HISTORY_CAP;

    use super::*;

    fn entry(scene: &str, title: &str) -> HistoryEntry {
        HistoryEntry::new(
            scene,
            title,
            VocabularyList {
                core: vec!["teacher 老师".to_string()],
                items: vec!["book 书".to_string()],
                environment: vec!["flag 国旗".to_string()],
            },
            "kie",
        )
    }

    #[test]
    fn quota_recovery_clears_then_retries_once() -> Result<()> {
        let temp = tempfile::tempdir()?;
        // Quota admits one entry but not two, so a second write trips it.
        let first = entry("学校", "first");
        let single_size = serde_json::to_string(&vec![first.clone()])?.len();
        let store = HistoryStore::with_quota(temp.path().join("history.json"), single_size + 32);
        let log = EventLog::new(temp.path().join("events.jsonl"), "test-session");

        record_history_with_recovery(&store, first, &log)?;
        record_history_with_recovery(&store, entry("公园", "second"), &log)?;

        let entries = store.entries();
        assert_eq!(entries.len(), 1, "history was cleared before the retry");
        assert_eq!(entries[0].title, "second");
        Ok(())
    }

    #[test]
    fn history_cap_still_holds_through_the_recovery_path() -> Result<()> {
        let temp = tempfile::tempdir()?;
        let store = HistoryStore::new(temp.path().join("history.json"));
        let log = EventLog::new(temp.path().join("events.jsonl"), "test-session");
        for index in 0..12 {
            record_history_with_recovery(&store, entry("学校", &format!("t-{index}")), &log)?;
        }
        assert_eq!(store.entries().len(), HISTORY_CAP);
        Ok(())
    }

    #[test]
    fn filename_component_flattens_separators() {
        assert_eq!(filename_component("逛 超市/啦"), "逛_超市_啦");
        assert_eq!(filename_component("学校"), "学校");
    }

    #[test]
    fn mask_secret_hides_the_tail() {
        assert_eq!(mask_secret(""), "(unset)");
        assert_eq!(mask_secret("sk-abcdef"), "sk-a…");
    }
}
