//! `retrace` - manage recorded UI test cases and local skills.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use retrace_lib::config::{self, AppConfig};
use retrace_lib::recording::{TestCase, TestCaseStore};
use retrace_lib::skills::{load_skills_dir, match_skills};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "retrace")]
#[command(about = "Record and replay natural-language UI tests", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Test case directory (overrides config)
    #[arg(long, global = true)]
    test_cases_dir: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// List test cases, newest first
    List,

    /// Show a test case step by step
    View {
        /// Test case ID
        id: String,
    },

    /// Delete a test case
    Delete {
        /// Test case ID
        id: String,
    },

    /// Search test cases by name, description, task or tag
    Search {
        query: String,
    },

    /// List local skills, or the ones matching a prompt
    Skills {
        /// Skills directory (overrides config)
        #[arg(long)]
        dir: Option<PathBuf>,

        /// Show skills matching this task text
        #[arg(short, long)]
        prompt: Option<String>,
    },

    /// Print the configuration file path
    ConfigPath,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let mut config = config::load_config().unwrap_or_else(|e| {
        tracing::warn!("Failed to load config: {}. Using defaults.", e);
        AppConfig::default()
    });
    if let Some(dir) = cli.test_cases_dir {
        config.storage.test_cases_dir = dir;
    }

    match cli.command {
        Commands::List => {
            let store = open_store(&config)?;
            let cases = store.list();
            if cases.is_empty() {
                println!("No test cases in {}", store.dir().display());
            }
            for tc in &cases {
                print_summary(tc);
            }
        }
        Commands::View { id } => {
            let store = open_store(&config)?;
            let tc = store.get(&id)?;
            print_test_case(&tc);
        }
        Commands::Delete { id } => {
            let store = open_store(&config)?;
            if !store.delete(&id)? {
                bail!("Test case not found: {}", id);
            }
            println!("Deleted {}", id);
        }
        Commands::Search { query } => {
            let store = open_store(&config)?;
            let found = store.search(&query);
            println!("{} match(es) for {:?}", found.len(), query);
            for tc in &found {
                print_summary(tc);
            }
        }
        Commands::Skills { dir, prompt } => {
            let dir = dir.unwrap_or_else(|| config.storage.skills_dir.clone());
            let skills = load_skills_dir(&dir);
            let shown: Vec<_> = match &prompt {
                Some(p) => match_skills(p, &skills, 5),
                None => skills.iter().collect(),
            };
            if shown.is_empty() {
                println!("No skills found in {}", dir.display());
            }
            for skill in shown {
                println!("{:<24} {}", skill.id, skill.description);
            }
        }
        Commands::ConfigPath => {
            println!("{}", config::get_config_path().display());
        }
    }

    Ok(())
}

fn open_store(config: &AppConfig) -> Result<TestCaseStore> {
    TestCaseStore::new(&config.storage.test_cases_dir).with_context(|| {
        format!(
            "Failed to open test case store at {}",
            config.storage.test_cases_dir.display()
        )
    })
}

fn print_summary(tc: &TestCase) {
    let status = if tc.metadata.partial {
        "partial"
    } else if tc.metadata.is_successful {
        "ok"
    } else {
        "failed"
    };
    println!(
        "{}  {:<7} {:>3} steps  {}",
        tc.id,
        status,
        tc.actions.len(),
        tc.name
    );
}

fn print_test_case(tc: &TestCase) {
    println!("ID:          {}", tc.id);
    println!("Name:        {}", tc.name);
    println!("Description: {}", tc.description);
    println!("Created:     {}", tc.created_at.format("%Y-%m-%d %H:%M:%S"));
    if !tc.start_url.is_empty() {
        println!("Start URL:   {}", tc.start_url);
    }
    println!("Task:        {}", tc.metadata.task);
    println!(
        "Result:      {}{}",
        if tc.metadata.is_successful { "successful" } else { "not successful" },
        if tc.metadata.partial { " (partial)" } else { "" }
    );
    if !tc.tags.is_empty() {
        println!("Tags:        {}", tc.tags.join(", "));
    }
    println!();

    for action in &tc.actions {
        println!("{:>3}. [{}] {}", action.step_number, action.action_type, action.action_name);
        if let Some(el) = &action.element_description {
            println!("     element: {}", el);
        }
        if let Some(goal) = &action.goal {
            println!("     goal:    {}", goal);
        }
        if let Some(thinking) = &action.thinking {
            println!("     thinking: {}", thinking);
        }
        let params = serde_json::Value::Object(action.plain_parameters());
        println!("     params:  {}", params);
    }
}
