//! Prompt construction from a text selection.
//!
//! The user prompt is chosen by selection length: long selections get a
//! summary request, mid-length ones a translation request, and short ones a
//! word explanation that folds in surrounding context. Length is measured in
//! words, where CJK text counts roughly two characters per word.

use crate::core::config::Settings;

/// A text selection plus whatever surrounding context the caller captured.
///
/// `before`/`after` are the preferred context form; `paragraph` is the
/// fallback when only the enclosing block of text is available.
#[derive(Debug, Default, Clone)]
pub struct SelectionContext {
    pub selected: String,
    pub before: Option<String>,
    pub after: Option<String>,
    pub paragraph: Option<String>,
}

impl SelectionContext {
    pub fn new(selected: impl Into<String>) -> Self {
        Self {
            selected: selected.into(),
            ..Default::default()
        }
    }
}

#[derive(Debug)]
pub struct BuiltPrompt {
    pub user: String,
    pub system: String,
}

const SUMMARY_THRESHOLD: usize = 500;
const TRANSLATION_THRESHOLD: usize = 5;

fn is_cjk(c: char) -> bool {
    matches!(c,
        '\u{4e00}'..='\u{9fff}'     // CJK unified ideographs
        | '\u{3040}'..='\u{309f}'   // hiragana
        | '\u{30a0}'..='\u{30ff}'   // katakana
        | '\u{ac00}'..='\u{d7af}'   // hangul
    )
}

/// Word count with CJK awareness: two CJK characters approximate one word,
/// everything else splits on whitespace.
pub fn word_count(text: &str) -> usize {
    let cjk_chars = text.chars().filter(|c| is_cjk(*c)).count();
    let non_cjk: String = text.chars().filter(|c| !is_cjk(*c)).collect();
    let non_cjk_words = non_cjk.split_whitespace().count();
    cjk_chars.div_ceil(2) + non_cjk_words
}

fn system_prompt(settings: &Settings) -> String {
    let tool_hint = if settings.any_search_key() {
        "\n- Use web_search tool if you need current information or are unsure about facts\n\
         - Use add_to_anki tool when user asks to save/memorize something\n\
         - For vocab cards: Front=word, Back=pronunciation+definition+context+examples"
    } else {
        ""
    };
    format!(
        "Respond in {} with HTML tags to improve readability.\n\
         - Prioritize clarity and conciseness\n\
         - Use bullet points when appropriate{}",
        settings.language, tool_hint
    )
}

/// Build the opening user prompt and system prompt for a selection.
pub fn build_prompt(context: &SelectionContext, settings: &Settings) -> BuiltPrompt {
    let system = system_prompt(settings);
    let words = word_count(&context.selected);

    if words >= SUMMARY_THRESHOLD {
        return BuiltPrompt {
            user: format!(
                "Create a structured summary in {}:\n\
                 - Identify key themes and concepts\n\
                 - Extract 3-5 main points\n\
                 - Use nested <ul> lists for hierarchy\n\
                 - Keep bullets concise\n\n\
                 for the following selected text:\n\n\n{}",
                settings.language, context.selected
            ),
            system,
        };
    }

    if words >= TRANSLATION_THRESHOLD {
        return BuiltPrompt {
            user: format!(
                "Translate exactly to {} without commentary:\n\
                 - Preserve technical terms and names\n\
                 - Maintain original punctuation\n\
                 - Match formal/informal tone of source\n\n\
                 for the following selected text:\n\n\n{}",
                settings.language, context.selected
            ),
            system,
        };
    }

    BuiltPrompt {
        user: explanation_prompt(context, settings),
        system,
    }
}

fn explanation_prompt(context: &SelectionContext, settings: &Settings) -> String {
    let selected = &context.selected;
    let chinese = settings.language == "Chinese";
    let pinyin_extra = if chinese { " DO NOT add Pinyin for it." } else { "" };
    let ipa_extra = if chinese { "(with IPA if necessary)" } else { "" };

    // Example sentences stay in English for pure-ASCII selections; sentences
    // for foreign-script words follow the response language.
    let skippable = |c: char| c.is_whitespace() || ".,-_'\"!?()".contains(c);
    let ascii_chars = selected
        .chars()
        .filter(|c| !skippable(*c) && c.is_ascii())
        .count();
    let sample_language = if selected.chars().count() == ascii_chars {
        "English"
    } else {
        settings.language.as_str()
    };

    let context_block = if context.before.is_some() || context.after.is_some() {
        format!(
            "# Context:\n\
             ## Before selected text:\n{}\n\
             ## Selected text:\n{}\n\
             ## After selected text:\n{}",
            context.before.as_deref().unwrap_or("None"),
            selected,
            context.after.as_deref().unwrap_or("None"),
        )
    } else {
        context.paragraph.clone().unwrap_or_default()
    };

    format!(
        "Provide an explanation for the word: \"{selected}{ipa_extra}\" in {language} without commentary.{pinyin_extra}\n\n\
         Use the context from the surrounding paragraph to inform your explanation when relevant:\n\n\
         {context_block}\n\n\
         # Consider these scenarios:\n\n\
         ## Names\n\
         If \"{selected}\" is a person's name, company name, or organization name, provide a brief description (e.g., who they are or what they do).\n\n\
         ## Technical Terms\n\
         If \"{selected}\" is a technical term or jargon:\n\
         - Give a concise definition and explain\n\
         - Some best practice of using it\n\
         - Explain how it works\n\
         - No need example sentence for technical terms\n\n\
         ## Normal Words\n\
         For any other word, explain its meaning and provide 1-2 example sentences with the word in {sample_language}.\n\n\
         # Format\n\
         - Output the words first, then the explanation, and then the example sentences in {sample_language} if necessary.\n\
         - No extra explanation\n\
         - Use proper HTML format like <p> <b> <i> <li> <ol> <ul> to improve readability.",
        language = settings.language,
    )
}
