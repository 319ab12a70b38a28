use std::fmt::Display;

use minijinja::{context, Environment, ErrorKind};
use minijinja_contrib::pycompat;

use crate::data::example::Message;
use crate::errors::Result;

/// Renders a message sequence into model input text
pub trait ChatRenderer: Send + Sync {
    fn render(&self, messages: &[Message], add_generation_prompt: bool) -> Result<String>;
}

/// A HuggingFace `chat_template` compiled with minijinja
pub struct HuggingFaceChatTemplate {
    environment: Environment<'static>,
    bos_token: String,
    eos_token: String,
}

impl HuggingFaceChatTemplate {
    pub fn create(
        chat_template: impl Display,
        bos_token: impl Into<String>,
        eos_token: impl Into<String>,
    ) -> Result<Self> {
        let chat_template = chat_template.to_string();
        let mut environment = Environment::new();

        // templates are written against python jinja
        environment.set_unknown_method_callback(pycompat::unknown_method_callback);

        let raise_exception = |err_text: String| -> std::result::Result<String, minijinja::Error> {
            Err(minijinja::Error::new(
                ErrorKind::InvalidOperation,
                format!("The template raised an exception: {}", err_text),
            ))
        };
        environment.add_function("raise_exception", raise_exception);

        environment.add_template_owned("main", chat_template)?;

        Ok(Self {
            environment,
            bos_token: bos_token.into(),
            eos_token: eos_token.into(),
        })
    }
}

impl ChatRenderer for HuggingFaceChatTemplate {
    fn render(&self, messages: &[Message], add_generation_prompt: bool) -> Result<String> {
        let bos_token = self.bos_token.as_str();
        let eos_token = self.eos_token.as_str();
        let ctx = context! { bos_token, eos_token, messages, add_generation_prompt };
        let template = self.environment.get_template("main")?;
        Ok(template.render(&ctx)?)
    }
}
