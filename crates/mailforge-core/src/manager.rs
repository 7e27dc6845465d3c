//! The manager: one template provider, one delivery path, shared defaults.

use std::fmt;
use std::sync::Arc;

use mailforge_mime::Headers;

use crate::clock::{Clock, SystemClock};
use crate::delivery::{DeliveryAgent, SmtpAgent};
use crate::error::Result;
use crate::message::Message;
use crate::modifier::Modifier;
use crate::settings::Settings;
use crate::template::TemplateProvider;

/// Adjusts the output headers of every message, after all defaults are
/// applied.
pub trait HeaderHook: Send + Sync {
    /// Updates `headers` for `message`.
    fn update_headers(&self, message: &Message, headers: &mut Headers);
}

impl<F> HeaderHook for F
where
    F: Fn(&Message, &mut Headers) + Send + Sync,
{
    fn update_headers(&self, message: &Message, headers: &mut Headers) {
        self(message, headers);
    }
}

/// Creates messages that share a template provider, default settings, a
/// modifier and a delivery agent.
///
/// Every message gets its own copy of the defaults; changing a message never
/// changes the manager or other messages.
pub struct Manager {
    provider: Arc<dyn TemplateProvider>,
    defaults: Settings,
    modifier: Option<Arc<dyn Modifier>>,
    agent: Arc<dyn DeliveryAgent>,
    clock: Arc<dyn Clock>,
    hook: Option<Arc<dyn HeaderHook>>,
}

impl fmt::Debug for Manager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Manager")
            .field("provider", &self.provider)
            .field("defaults", &self.defaults)
            .field("modifier", &self.modifier)
            .field("agent", &self.agent)
            .field("hook", &self.hook.is_some())
            .finish_non_exhaustive()
    }
}

impl Manager {
    /// Starts building a manager around `provider`.
    pub fn builder(provider: impl TemplateProvider + 'static) -> ManagerBuilder {
        ManagerBuilder::new(Arc::new(provider))
    }

    /// Creates a message from the template called `name`.
    ///
    /// # Errors
    ///
    /// Returns an error if the provider cannot load the template.
    pub fn new_message(&self, name: &str) -> Result<Message> {
        let template = self.provider.template(name)?;
        tracing::debug!(template = name, "new message");
        Ok(Message::new(name, template, self.defaults.clone())
            .with_agent(Arc::clone(&self.agent))
            .with_modifier(self.modifier.clone())
            .with_hook(self.hook.clone())
            .with_clock(Arc::clone(&self.clock)))
    }

    /// Settings copied into new messages.
    #[must_use]
    pub const fn defaults(&self) -> &Settings {
        &self.defaults
    }

    /// Mutable access to the defaults; affects messages created afterwards.
    pub const fn defaults_mut(&mut self) -> &mut Settings {
        &mut self.defaults
    }

    /// The delivery agent.
    #[must_use]
    pub fn agent(&self) -> &Arc<dyn DeliveryAgent> {
        &self.agent
    }
}

/// Builder for [`Manager`].
pub struct ManagerBuilder {
    provider: Arc<dyn TemplateProvider>,
    defaults: Settings,
    modifier: Option<Arc<dyn Modifier>>,
    agent: Option<Arc<dyn DeliveryAgent>>,
    clock: Arc<dyn Clock>,
    hook: Option<Arc<dyn HeaderHook>>,
}

impl ManagerBuilder {
    /// Creates a builder with default settings, no modifier, and SMTP
    /// delivery to `localhost:25`.
    #[must_use]
    pub fn new(provider: Arc<dyn TemplateProvider>) -> Self {
        Self {
            provider,
            defaults: Settings::default(),
            modifier: None,
            agent: None,
            clock: Arc::new(SystemClock),
            hook: None,
        }
    }

    /// Sets the default settings.
    #[must_use]
    pub fn defaults(mut self, defaults: Settings) -> Self {
        self.defaults = defaults;
        self
    }

    /// Sets the modifier.
    #[must_use]
    pub fn modifier(mut self, modifier: impl Modifier + 'static) -> Self {
        self.modifier = Some(Arc::new(modifier));
        self
    }

    /// Sets the delivery agent.
    #[must_use]
    pub fn agent(mut self, agent: Arc<dyn DeliveryAgent>) -> Self {
        self.agent = Some(agent);
        self
    }

    /// Sets the clock.
    #[must_use]
    pub fn clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Arc::new(clock);
        self
    }

    /// Sets the header hook.
    #[must_use]
    pub fn hook(mut self, hook: impl HeaderHook + 'static) -> Self {
        self.hook = Some(Arc::new(hook));
        self
    }

    /// Builds the manager.
    #[must_use]
    pub fn build(self) -> Manager {
        Manager {
            provider: self.provider,
            defaults: self.defaults,
            modifier: self.modifier,
            agent: self
                .agent
                .unwrap_or_else(|| Arc::new(SmtpAgent::default())),
            clock: self.clock,
            hook: self.hook,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::delivery::RecordingAgent;
    use crate::template::{SingleProvider, SourceTemplate};

    fn manager(agent: &RecordingAgent) -> Manager {
        Manager::builder(SingleProvider::new(SourceTemplate::new().with_format("text", "Hi {{ name }}")))
            .agent(Arc::new(agent.clone()))
            .build()
    }

    #[test]
    fn test_messages_do_not_share_state() {
        let agent = RecordingAgent::new();
        let mut manager = manager(&agent);
        manager.defaults_mut().headers.set("From", "noreply@example.com");

        let mut first = manager.new_message("a").unwrap();
        first.set_header("To", "a@example.com");
        first.set_param("name", "Ann");
        let second = manager.new_message("b").unwrap();

        assert_eq!(second.header("to"), None);
        assert_eq!(second.header("from"), Some("noreply@example.com"));
        assert!(second.params().get("name").is_none());
        assert!(manager.defaults().params.is_empty());
    }

    #[test]
    fn test_hook_runs_last() {
        let agent = RecordingAgent::new();
        let manager = Manager::builder(SingleProvider::new(SourceTemplate::new().with_format("text", "Hi")))
            .agent(Arc::new(agent.clone()))
            .hook(|message: &Message, headers: &mut Headers| {
                headers.set("Subject", format!("[{}] overridden", message.name()));
                headers.set("Bcc", "audit@example.com");
            })
            .build();
        let mut message = manager.new_message("weekly").unwrap();
        message.set_header("From", "a@example.com");
        message.set_header("To", "b@example.com");
        message.set_header("Subject", "Original");
        message.send(None, None).unwrap();

        let sent = &agent.sent()[0];
        assert_eq!(sent.recipients, ["b@example.com", "audit@example.com"]);
        let text = sent.message_text();
        assert!(text.contains("Subject: [weekly] overridden\n"));
        assert!(!text.contains("audit@example.com"));
    }
}
