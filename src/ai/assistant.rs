use super::retry::RetryPolicy;
use super::{GenerativeModel, PromptPart};

const SYSTEM_PREAMBLE: &str = "You are the assistant of an RPA operations dashboard. \
     You help operators plan, prioritise and troubleshoot robotic process automation \
     tasks and inventory cataloguing. Answer concisely and with actionable steps.\n\n\
     Operator question: ";

pub fn build_prompt(query: &str) -> String {
    format!("{}{}", SYSTEM_PREAMBLE, query)
}

pub struct AssistantPipeline<'a> {
    model: &'a dyn GenerativeModel,
    policy: RetryPolicy,
}

impl<'a> AssistantPipeline<'a> {
    pub fn new(model: &'a dyn GenerativeModel, policy: RetryPolicy) -> Self {
        Self { model, policy }
    }

    /// Returns `None` for an empty query or once every attempt has failed.
    pub async fn ask(&self, query: &str) -> Option<String> {
        if query.trim().is_empty() {
            log::warn!("Empty question; nothing sent to the model");
            return None;
        }

        let parts = [PromptPart::Text(build_prompt(query))];

        for attempt in 1..=self.policy.max_attempts {
            match self.model.generate(&parts).await {
                Ok(text) => return Some(text),
                Err(e) => {
                    log::warn!(
                        "Attempt {}/{} with {} failed: {}",
                        attempt,
                        self.policy.max_attempts,
                        self.model.model_name(),
                        e
                    );
                    if attempt < self.policy.max_attempts {
                        let delay = self.policy.delay_after(attempt);
                        if !delay.is_zero() {
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
        }

        log::error!(
            "No answer from the assistant after {} attempts",
            self.policy.max_attempts
        );
        None
    }
}
