//! Local skills: `SKILL.md` documents injected into the agent prompt.
//!
//! A skill lives in its own directory under the skills root. Its id is the
//! directory path relative to the root (`login`, `auth/sso`).

use regex::Regex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

const SKILL_FILE: &str = "SKILL.md";

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct LocalSkill {
    pub id: String,
    pub name: String,
    pub description: String,
    /// Markdown body after the front matter
    pub content: String,
    pub file_path: PathBuf,
}

/// Split `---` delimited front matter into key/value pairs and the body.
fn parse_front_matter(content: &str) -> (HashMap<String, String>, &str) {
    let mut fields = HashMap::new();

    let Some(rest) = content.trim_start().strip_prefix("---") else {
        return (fields, content);
    };
    let Some((front, body)) = rest.split_once("---") else {
        return (fields, content);
    };

    for line in front.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some((key, value)) = line.split_once(':') {
            let value = value.trim().trim_matches(|c| c == '"' || c == '\'');
            fields.insert(key.trim().to_string(), value.to_string());
        }
    }

    (fields, body.trim_start_matches(['\r', '\n']))
}

/// Parse one `SKILL.md`. Skills without a name or description are ignored.
pub fn parse_skill_md(path: &Path, id: &str) -> Option<LocalSkill> {
    let text = match std::fs::read_to_string(path) {
        Ok(text) => text,
        Err(e) => {
            tracing::warn!("Failed to read skill {:?}: {}", path, e);
            return None;
        }
    };

    let (fields, body) = parse_front_matter(&text);
    let name = fields.get("name").map(|s| s.trim()).unwrap_or_default();
    let description = fields
        .get("description")
        .map(|s| s.trim())
        .unwrap_or_default();
    if name.is_empty() || description.is_empty() {
        tracing::debug!("Skipping skill {:?}: missing name or description", path);
        return None;
    }

    Some(LocalSkill {
        id: id.to_string(),
        name: name.to_string(),
        description: description.to_string(),
        content: body.trim().to_string(),
        file_path: path.to_path_buf(),
    })
}

/// Recursively load every skill under `root`, sorted by id.
pub fn load_skills_dir(root: &Path) -> Vec<LocalSkill> {
    let mut skills = Vec::new();
    if root.is_dir() {
        collect_skills(root, root, &mut skills);
    }
    skills.sort_by(|a, b| a.id.cmp(&b.id));
    skills
}

fn collect_skills(root: &Path, dir: &Path, out: &mut Vec<LocalSkill>) {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            tracing::warn!("Failed to scan skills directory {:?}: {}", dir, e);
            return;
        }
    };

    for path in entries.flatten().map(|e| e.path()).filter(|p| p.is_dir()) {
        let skill_md = path.join(SKILL_FILE);
        if skill_md.is_file() {
            if let Ok(rel) = path.strip_prefix(root) {
                let id = rel.to_string_lossy().replace('\\', "/");
                if let Some(skill) = parse_skill_md(&skill_md, &id) {
                    out.push(skill);
                }
            }
        }
        collect_skills(root, &path, out);
    }
}

fn ascii_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[a-z0-9]+").expect("valid regex"))
}

fn cjk_run_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"[\x{4e00}-\x{9fff}]+").expect("valid regex"))
}

/// ASCII words plus CJK bigrams, so `登录系统` matches `登录`.
fn text_tokens(text: &str) -> HashSet<String> {
    let lower = text.to_lowercase();
    let mut tokens: HashSet<String> = ascii_word_re()
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect();

    for run in cjk_run_re().find_iter(text) {
        let chars: Vec<char> = run.as_str().chars().collect();
        for pair in chars.windows(2) {
            tokens.insert(pair.iter().collect());
        }
    }

    tokens
}

/// Rank skills by keyword overlap with `prompt` and keep the best `top_k`.
pub fn match_skills<'a>(prompt: &str, skills: &'a [LocalSkill], top_k: usize) -> Vec<&'a LocalSkill> {
    let prompt_tokens = text_tokens(prompt);
    if prompt_tokens.is_empty() {
        return Vec::new();
    }

    let mut scored: Vec<(f64, &LocalSkill)> = skills
        .iter()
        .filter_map(|skill| {
            let desc = text_tokens(&skill.description);
            let name = text_tokens(&skill.name);
            let score = prompt_tokens.intersection(&desc).count() as f64
                + 0.5 * prompt_tokens.intersection(&name).count() as f64;
            (score > 0.0).then_some((score, skill))
        })
        .collect();

    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.into_iter().take(top_k).map(|(_, s)| s).collect()
}

/// Skills to inject for a task: the forced skill (if any) first, then matches.
pub fn select_skills<'a>(
    prompt: &str,
    skills: &'a [LocalSkill],
    force_skill: Option<&str>,
    top_k: usize,
) -> Vec<&'a LocalSkill> {
    let mut selected: Vec<&LocalSkill> = Vec::new();

    if let Some(forced) = force_skill {
        match skills.iter().find(|s| s.id == forced || s.name == forced) {
            Some(skill) => selected.push(skill),
            None => tracing::warn!("Forced skill {:?} not found", forced),
        }
    }

    for skill in match_skills(prompt, skills, top_k) {
        if selected.len() >= top_k.max(1) {
            break;
        }
        if !selected.iter().any(|s| s.id == skill.id) {
            selected.push(skill);
        }
    }

    selected
}

/// Render skills as the agent's extended system message.
pub fn build_extend_system_message(skills: &[&LocalSkill]) -> Option<String> {
    if skills.is_empty() {
        return None;
    }

    let blocks: Vec<String> = skills
        .iter()
        .map(|s| format!("## Skill: {}\n{}\n\n{}", s.name, s.description, s.content))
        .collect();
    Some(blocks.join("\n\n---\n\n"))
}
