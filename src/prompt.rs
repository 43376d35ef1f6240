use reedline::{Prompt, PromptEditMode, PromptHistorySearch, PromptHistorySearchStatus};
use std::borrow::Cow;

/// REPL prompt showing the database and the active backend: `chinook (OpenAI)> `
pub struct AskPrompt {
    db_name: String,
    provider_name: String,
}

impl AskPrompt {
    pub fn new(db_name: &str, provider_name: &str) -> Self {
        Self {
            db_name: db_name.to_string(),
            provider_name: provider_name.to_string(),
        }
    }
}

impl Prompt for AskPrompt {
    fn render_prompt_left(&self) -> Cow<'_, str> {
        Cow::Owned(format!("{} ({})", self.db_name, self.provider_name))
    }

    fn render_prompt_right(&self) -> Cow<'_, str> {
        Cow::Borrowed("")
    }

    fn render_prompt_indicator(&self, edit_mode: PromptEditMode) -> Cow<'_, str> {
        match edit_mode {
            PromptEditMode::Default | PromptEditMode::Emacs => Cow::Borrowed("> "),
            PromptEditMode::Vi(vi_mode) => match vi_mode {
                reedline::PromptViMode::Insert => Cow::Borrowed("[INS]> "),
                reedline::PromptViMode::Normal => Cow::Borrowed("[NOR]> "),
            },
            PromptEditMode::Custom(_) => Cow::Borrowed("> "),
        }
    }

    fn render_prompt_multiline_indicator(&self) -> Cow<'_, str> {
        Cow::Borrowed("... ")
    }

    fn render_prompt_history_search_indicator(
        &self,
        history_search: PromptHistorySearch,
    ) -> Cow<'_, str> {
        let prefix = match history_search.status {
            PromptHistorySearchStatus::Passing => "",
            PromptHistorySearchStatus::Failing => "failing ",
        };
        match history_search.term.as_str() {
            "" => Cow::Owned(format!("({prefix}reverse-search): ")),
            term => Cow::Owned(format!("({prefix}reverse-search '{term}'): ")),
        }
    }
}
