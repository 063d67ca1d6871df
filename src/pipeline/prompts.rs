//! Prompt composition: substitutes the placeholder vocabulary of
//! spec.md §6 (`{fileName}`, `{fileContent}`, `{mimeType}`,
//! `{additionalPrompts}`) into the configured prompt templates, with a
//! sensible built-in default for each when the config key is unset.

use crate::config::Config;
use crate::extractor::ExtractedContent;

fn substitute(template: &str, content: &ExtractedContent, additional_prompts: &str) -> String {
    template
        .replace("{fileName}", &content.original_name)
        .replace("{fileContent}", &content.text_excerpt)
        .replace("{mimeType}", content.mime_category.as_str())
        .replace("{additionalPrompts}", additional_prompts)
}

const DEFAULT_ORGANIZATION_PROMPT_TEMPLATE: &str = "\
You are organizing a file named \"{fileName}\" (category: {mimeType}). Here is its content:\n\n\
{fileContent}\n\n\
{additionalPrompts}\n\
Respond with ONLY a JSON object matching the requested schema.";

const DEFAULT_REANALYZE_PROMPT: &str = "\
Re-analyze the file \"{fileName}\" (category: {mimeType}) given its content:\n\n\
{fileContent}\n\n\
{additionalPrompts}\n\
Respond with ONLY a JSON object containing title, category, tags, and summary.";

const DEFAULT_WATCH_MODE_PROMPT: &str = "\
A new file \"{fileName}\" (category: {mimeType}) was just added to a watched folder. Content:\n\n\
{fileContent}\n\n\
{additionalPrompts}\n\
Respond with ONLY a JSON object containing title, category, tags, and summary.";

const DEFAULT_IMAGE_CAPTION_PROMPT: &str = "Describe this image in one or two sentences, noting anything that would help categorize or name the file.";

/// The organization prompt used by §4.4 step 1 (basic understanding) and
/// every subsequent multi-call step, and by single-call mode.
pub fn organization_prompt(config: &Config, content: &ExtractedContent, additional: &str) -> String {
    let template = config
        .get("ORGANIZATION_PROMPT_TEMPLATE")
        .unwrap_or(DEFAULT_ORGANIZATION_PROMPT_TEMPLATE);
    substitute(template, content, additional)
}

pub fn reanalyze_prompt(config: &Config, content: &ExtractedContent, additional: &str) -> String {
    let template = config.get("REANALYZE_PROMPT").unwrap_or(DEFAULT_REANALYZE_PROMPT);
    substitute(template, content, additional)
}

pub fn watch_mode_prompt(config: &Config, content: &ExtractedContent, additional: &str) -> String {
    let template = config.get("WATCH_MODE_PROMPT").unwrap_or(DEFAULT_WATCH_MODE_PROMPT);
    substitute(template, content, additional)
}

pub fn image_caption_prompt(config: &Config) -> String {
    config
        .get("IMAGE_CAPTION_PROMPT")
        .unwrap_or(DEFAULT_IMAGE_CAPTION_PROMPT)
        .to_string()
}
