//! Application context.
//!
//! [`ChatApp`] ties the channel registry, the chatter service and the
//! recipient directory together and handles the inbound events of a chat
//! server: sessions starting and ending, chat lines and `/channels`
//! commands.

use std::sync::Arc;

use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::channel::{Channel, ChannelRegistry, DeliveryReport, SimpleChannel};
use crate::chatter::{
    Chatter, ChatterProvider, ChatterService, JsonFileStorage, PersistOptions,
    SimpleChatterProvider,
};
use crate::command::{self, ChannelsCommand, CommandError};
use crate::condition::{parse_conditions, try_parse_conditions};
use crate::config::{ChannelSettings, Config};
use crate::recipient::{Recipient, RecipientDirectory};
use crate::text::{Color, RichText, Style};
use crate::{ChatError, Result};

/// Permission required to create channels at runtime.
pub const ADMIN_PERMISSION: &str = "hubbub.admin";

/// Name of the built-in chatter provider.
pub const DEFAULT_PROVIDER_NAME: &str = "json-file";

/// Result of routing one chat line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatOutcome {
    /// The sender has no chatter, or is not connected.
    NoChatter,
    /// No marker matched and the sender has no active channel.
    NoChannel,
    /// The sender fails the channel's conditions.
    Denied,
    /// Nothing left to send once the marker was stripped.
    Empty,
    /// The message was dispatched.
    Delivered(DeliveryReport),
}

/// Chat application context.
pub struct ChatApp {
    registry: ChannelRegistry,
    chatters: ChatterService,
    directory: Arc<dyn RecipientDirectory>,
    default_channel: Option<String>,
}

impl ChatApp {
    /// Create an empty context with no channels and no chatter provider.
    pub fn new(directory: Arc<dyn RecipientDirectory>, default_channel: Option<String>) -> Self {
        Self {
            registry: ChannelRegistry::new(),
            chatters: ChatterService::new(),
            directory,
            default_channel,
        }
    }

    /// Build a context from configuration.
    ///
    /// Registers every valid channel entry, and installs the JSON file
    /// provider unless `default_chatter_provider` is off.
    pub fn bootstrap(config: &Config, directory: Arc<dyn RecipientDirectory>) -> Self {
        let app = Self::new(directory, config.default_channel.clone());

        for settings in config.channel_settings() {
            let channel = app.build_channel(&settings);
            app.registry.register(channel);
        }

        if let Some(name) = &app.default_channel {
            if app.registry.find(name).is_none() {
                warn!(channel = %name, "Default channel is not registered");
            }
        }

        if config.default_chatter_provider {
            let provider = SimpleChatterProvider::new(
                DEFAULT_PROVIDER_NAME,
                JsonFileStorage::new(&config.storage.path),
                PersistOptions::from(&config.persistence),
            );
            // A fresh service cannot already hold a provider
            if let Err(e) = app.install_provider(Arc::new(provider)) {
                warn!("Default chatter provider not installed: {e}");
            }
        } else {
            info!("Default chatter provider disabled, waiting for another provider");
        }

        info!(channels = app.registry.len(), "Chat application ready");
        app
    }

    /// Build a channel from validated settings.
    ///
    /// Bad condition clauses are logged and dropped.
    pub fn build_channel(&self, settings: &ChannelSettings) -> Arc<dyn Channel> {
        Arc::new(
            SimpleChannel::new(
                &settings.name,
                RichText::from_legacy(&settings.prefix),
                &settings.marker,
                Arc::clone(&self.directory),
            )
            .with_description(&settings.description)
            .with_icon(settings.icon)
            .with_conditions(parse_conditions(&settings.conditions)),
        )
    }

    /// Install the chatter provider. Only the first installation succeeds.
    pub fn install_provider(&self, provider: Arc<dyn ChatterProvider>) -> Result<()> {
        self.chatters.set_provider(provider)
    }

    /// The channel registry.
    pub fn registry(&self) -> &ChannelRegistry {
        &self.registry
    }

    /// The chatter service.
    pub fn chatters(&self) -> &ChatterService {
        &self.chatters
    }

    /// The recipient directory.
    pub fn directory(&self) -> &Arc<dyn RecipientDirectory> {
        &self.directory
    }

    /// The chatter of a user, if one is in memory.
    pub fn chatter(&self, id: Uuid) -> Option<Arc<Chatter>> {
        self.chatters.provider()?.get_chatter(id)
    }

    /// Handle a session start.
    ///
    /// Creates the chatter, waits for its stored state, then makes the
    /// user listen to every usable channel that is not muted. A failed load
    /// is returned after the user has been attached with default state.
    /// If the session ends or restarts before the load completes, the stale
    /// chatter is not attached.
    pub async fn session_started(&self, id: Uuid) -> Result<()> {
        let actor = self.directory.resolve(id);
        let Some(provider) = self.chatters.provider() else {
            warn!(user = %id, "Session started before a chatter provider was installed");
            if let Some(actor) = &actor {
                self.attach(None, actor.as_ref());
            }
            return Err(ChatError::NotFound("chatter provider".to_string()));
        };

        let chatter = Arc::new(Chatter::online(id));
        provider.put_chatter(Arc::clone(&chatter));
        let loaded = provider.load(Arc::clone(&chatter)).wait().await;

        // The session may have ended while the load was pending
        let current = provider.get_chatter(id);
        if !current.is_some_and(|c| Arc::ptr_eq(&c, &chatter)) {
            debug!(user = %id, "Session ended before its chatter loaded");
            return loaded;
        }

        match &actor {
            Some(actor) => self.attach(Some(&chatter), actor.as_ref()),
            None => debug!(user = %id, "Session user is not in the directory"),
        }
        debug!(user = %id, channel = ?chatter.active_channel(), "Session started");
        loaded
    }

    /// Handle a session end.
    ///
    /// Removes the user from every channel, then saves and evicts the
    /// chatter. Resolves once the save has finished.
    pub async fn session_ended(&self, id: Uuid) -> Result<()> {
        let left = self.registry.remove_listener_everywhere(id);
        debug!(user = %id, channels = left, "Session ended");

        let Some(provider) = self.chatters.provider() else {
            return Ok(());
        };
        let Some(chatter) = provider.remove_chatter(id) else {
            return Ok(());
        };
        chatter.touch();
        provider.save(chatter).wait().await
    }

    /// Load offline chatters for users that were connected before the
    /// chat subsystem started.
    ///
    /// Users that already have a chatter are skipped. Returns how many
    /// chatters loaded cleanly.
    pub async fn warm_up(&self, ids: impl IntoIterator<Item = Uuid>) -> usize {
        let Some(provider) = self.chatters.provider() else {
            warn!("Cannot warm up chatters without a provider");
            return 0;
        };

        let mut pending = Vec::new();
        for id in ids {
            if provider.get_chatter(id).is_some() {
                continue;
            }
            let chatter = Arc::new(Chatter::offline(id));
            provider.put_chatter(Arc::clone(&chatter));
            let ticket = provider.load(Arc::clone(&chatter));
            pending.push((chatter, ticket));
        }

        let mut loaded = 0;
        for (chatter, ticket) in pending {
            if ticket.wait().await.is_ok() {
                loaded += 1;
            }
            if let Some(actor) = self.directory.resolve(chatter.id()) {
                self.attach(Some(&chatter), actor.as_ref());
            }
        }
        info!(loaded, "Warmed up chatters");
        loaded
    }

    /// Join usable, unmuted channels and settle the active channel.
    fn attach(&self, chatter: Option<&Chatter>, actor: &dyn Recipient) {
        let muted = |channel: &dyn Channel| chatter.is_some_and(|c| c.is_muted(channel.name()));

        for channel in self.registry.all() {
            if !muted(channel.as_ref()) && channel.can_use(actor) {
                channel.add_listener(actor.id());
            }
        }

        let Some(chatter) = chatter else {
            return;
        };
        let usable = |name: &str| {
            self.registry
                .find(name)
                .filter(|c| c.can_use(actor) && !muted(c.as_ref()))
        };
        let current = chatter.active_channel().and_then(|name| usable(&name));
        if current.is_none() {
            let fallback = self.default_channel.as_deref().and_then(usable);
            chatter.set_active_channel(fallback.map(|c| c.name().to_string()));
        }
    }

    /// Route a chat line.
    ///
    /// A leading channel marker addresses that channel for this message
    /// only. Otherwise the message goes to the sender's active channel.
    pub fn chat(&self, sender: Uuid, raw: &str) -> ChatOutcome {
        let (Some(chatter), Some(actor)) = (self.chatter(sender), self.directory.resolve(sender))
        else {
            return ChatOutcome::NoChatter;
        };

        let text = raw.trim();
        let (channel, body) = match self.registry.find_by_marker(text) {
            Some((channel, rest)) => (channel, rest.trim()),
            None => match chatter.active_channel().and_then(|n| self.registry.find(&n)) {
                Some(channel) => (channel, text),
                None => return ChatOutcome::NoChannel,
            },
        };

        if !channel.can_use(actor.as_ref()) {
            debug!(user = %sender, channel = %channel.name(), "Sender may not use channel");
            return ChatOutcome::Denied;
        }
        if body.is_empty() {
            return ChatOutcome::Empty;
        }

        let mut message = RichText::new();
        message.push(actor.display_name(), Style::colored(Color::White));
        message.push(": ", Style::colored(Color::Gray));
        message.append(RichText::from_legacy(body));

        let hides_sender =
            |listener: Uuid| self.chatter(listener).is_some_and(|c| c.is_ignoring(sender));
        ChatOutcome::Delivered(channel.send_from(sender, message, &hides_sender))
    }

    /// Run a `/channels` command line for a sender and return the reply.
    pub fn command(&self, sender: Uuid, line: &str) -> Vec<String> {
        let Some(actor) = self.directory.resolve(sender) else {
            return vec!["You are not connected.".to_string()];
        };

        let parsed = match command::parse_command(line) {
            Ok(parsed) => parsed,
            Err(e @ CommandError::UnknownSubcommand(_)) => {
                let mut lines = vec![e.to_string()];
                lines.extend(command::format_help());
                return lines;
            }
            Err(e) => return vec![e.to_string()],
        };

        debug!(user = %sender, command = %parsed, "Running channels command");
        match self.execute(actor.as_ref(), parsed) {
            Ok(lines) => lines,
            Err(e) => vec![e.to_string()],
        }
    }

    fn find_channel(&self, name: &str) -> Result<Arc<dyn Channel>> {
        self.registry
            .find(name)
            .ok_or_else(|| ChatError::NotFound(format!("channel '{name}'")))
    }

    fn require_chatter(&self, id: Uuid) -> Result<Arc<Chatter>> {
        self.chatter(id)
            .ok_or_else(|| ChatError::NotFound("chatter".to_string()))
    }

    /// Resolve a user by id or display name.
    fn find_user(&self, target: &str) -> Result<Uuid> {
        Uuid::parse_str(target)
            .ok()
            .or_else(|| self.directory.find_by_name(target).map(|r| r.id()))
            .ok_or_else(|| ChatError::NotFound(format!("user '{target}'")))
    }

    fn execute(&self, actor: &dyn Recipient, cmd: ChannelsCommand) -> Result<Vec<String>> {
        let id = actor.id();
        match cmd {
            ChannelsCommand::Help => Ok(command::format_help()),
            ChannelsCommand::List => Ok(self.list_channels(actor)),
            ChannelsCommand::Join(name) => {
                let channel = self.find_channel(&name)?;
                if !channel.can_use(actor) {
                    return Err(ChatError::Permission(format!(
                        "cannot use channel '{}'",
                        channel.name()
                    )));
                }
                channel.add_listener(id);
                if let Some(chatter) = self.chatter(id) {
                    chatter.unmute(channel.name());
                    chatter.set_active_channel(Some(channel.name().to_string()));
                }
                Ok(vec![format!("Joined {}.", channel.name())])
            }
            ChannelsCommand::Leave(name) => {
                let channel = self.find_channel(&name)?;
                let was_listening = channel.remove_listener(id);
                if let Some(chatter) = self.chatter(id) {
                    clear_active(&chatter, channel.name());
                }
                if was_listening {
                    Ok(vec![format!("Left {}.", channel.name())])
                } else {
                    Ok(vec![format!("You are not in {}.", channel.name())])
                }
            }
            ChannelsCommand::Mute(name) => {
                let channel = self.find_channel(&name)?;
                let chatter = self.require_chatter(id)?;
                channel.remove_listener(id);
                clear_active(&chatter, channel.name());
                if chatter.mute(channel.name()) {
                    Ok(vec![format!("Muted {}.", channel.name())])
                } else {
                    Ok(vec![format!("{} is already muted.", channel.name())])
                }
            }
            ChannelsCommand::Unmute(name) => {
                let channel = self.find_channel(&name)?;
                let chatter = self.require_chatter(id)?;
                if !chatter.unmute(channel.name()) {
                    return Ok(vec![format!("{} is not muted.", channel.name())]);
                }
                if channel.can_use(actor) {
                    channel.add_listener(id);
                }
                Ok(vec![format!("Unmuted {}.", channel.name())])
            }
            ChannelsCommand::Ignore(target) => {
                let other = self.find_user(&target)?;
                let chatter = self.require_chatter(id)?;
                if other == id {
                    return Ok(vec!["You cannot ignore yourself.".to_string()]);
                }
                if chatter.ignore(other) {
                    Ok(vec![format!("Ignoring {target}.")])
                } else {
                    Ok(vec![format!("Already ignoring {target}.")])
                }
            }
            ChannelsCommand::Unignore(target) => {
                let other = self.find_user(&target)?;
                let chatter = self.require_chatter(id)?;
                if chatter.unignore(other) {
                    Ok(vec![format!("No longer ignoring {target}.")])
                } else {
                    Ok(vec![format!("You are not ignoring {target}.")])
                }
            }
            ChannelsCommand::Create {
                name,
                marker,
                prefix,
                conditions,
            } => self.create_channel(actor, &name, &marker, &prefix, &conditions),
            ChannelsCommand::Info(name) => {
                let channel = self.find_channel(&name)?;
                Ok(channel_info(channel.as_ref()))
            }
        }
    }

    /// Make every connected user that may use `channel` and has not muted
    /// it listen to it. Returns how many listeners were added.
    fn attach_connected(&self, channel: &dyn Channel) -> usize {
        let Some(provider) = self.chatters.provider() else {
            return 0;
        };
        let mut joined = 0;
        for chatter in provider.chatters() {
            if chatter.is_muted(channel.name()) {
                continue;
            }
            let Some(actor) = self.directory.resolve(chatter.id()) else {
                continue;
            };
            if channel.can_use(actor.as_ref()) && channel.add_listener(chatter.id()) {
                joined += 1;
            }
        }
        joined
    }

    fn list_channels(&self, actor: &dyn Recipient) -> Vec<String> {
        let chatter = self.chatter(actor.id());
        let active = chatter.as_ref().and_then(|c| c.active_channel());

        let mut lines = vec!["=== Channels ===".to_string()];
        for channel in self.registry.all() {
            if !channel.can_use(actor) {
                continue;
            }
            let mut line = format!("{} {}", channel.marker(), channel.name());
            if !channel.description().is_empty() {
                line.push_str(&format!(" - {}", channel.description()));
            }
            if active
                .as_deref()
                .is_some_and(|a| a.eq_ignore_ascii_case(channel.name()))
            {
                line.push_str(" [active]");
            }
            if chatter.as_ref().is_some_and(|c| c.is_muted(channel.name())) {
                line.push_str(" [muted]");
            }
            lines.push(line);
        }
        if lines.len() == 1 {
            lines.push("(no channels available)".to_string());
        }
        lines
    }

    /// Create and register a channel on behalf of `actor`.
    pub fn create_channel(
        &self,
        actor: &dyn Recipient,
        name: &str,
        marker: &str,
        prefix: &str,
        conditions: &str,
    ) -> Result<Vec<String>> {
        if !actor.has_permission(ADMIN_PERMISSION) {
            return Err(ChatError::Permission(format!(
                "{ADMIN_PERMISSION} is required to create channels"
            )));
        }
        if self.registry.find(name).is_some() {
            return Ok(vec![format!("Channel {name} already exists.")]);
        }

        let mut lines = Vec::new();
        let (parsed, errors) = try_parse_conditions(conditions);
        for (clause, e) in errors {
            warn!(
                channel = %name,
                clause = %clause,
                "Unsupported condition, channel will deny it: {e}"
            );
            lines.push(format!("Unsupported condition '{clause}' denies everyone: {e}"));
        }

        let channel: Arc<dyn Channel> = Arc::new(
            SimpleChannel::new(
                name,
                RichText::from_legacy(prefix),
                marker,
                Arc::clone(&self.directory),
            )
            .with_conditions(parsed),
        );

        if self.registry.register(Arc::clone(&channel)) {
            info!(channel = %name, by = %actor.id(), "Channel created");
            let joined = self.attach_connected(channel.as_ref());
            debug!(channel = %name, joined, "Attached connected users");
            lines.push(format!("Created channel {name}."));
        } else {
            lines.push(format!("Channel {name} already exists."));
        }
        Ok(lines)
    }
}

fn clear_active(chatter: &Chatter, channel: &str) {
    chatter.update(|s| {
        if s
            .channel
            .as_deref()
            .is_some_and(|c| c.eq_ignore_ascii_case(channel))
        {
            s.channel = None;
        }
    });
}

fn channel_info(channel: &dyn Channel) -> Vec<String> {
    let conditions = channel.conditions();
    let conditions = if conditions.is_empty() {
        "none".to_string()
    } else {
        conditions
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    };

    vec![
        format!("=== {} ===", channel.name()),
        format!("Description: {}", channel.description()),
        format!("Marker: {}", channel.marker()),
        format!("Prefix: {}", channel.prefix().to_legacy()),
        format!("Icon: {}", channel.icon()),
        format!("Listeners: {}", channel.listener_count()),
        format!("Conditions: {conditions}"),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::Icon;
    use crate::chatter::MemoryStorage;
    use crate::recipient::{LocalDirectory, LocalRecipient};

    struct Fixture {
        app: ChatApp,
        directory: Arc<LocalDirectory>,
    }

    impl Fixture {
        fn new() -> Self {
            let directory = Arc::new(LocalDirectory::new());
            let app = ChatApp::new(directory.clone(), Some("global".to_string()));
            app.install_provider(Arc::new(SimpleChatterProvider::new(
                "memory",
                MemoryStorage::new(),
                PersistOptions::default(),
            )))
            .unwrap();

            for (name, marker, conditions) in [
                ("Global", "!", ""),
                ("Staff", "#", "chat.staff"),
                ("Trade", "$", ""),
            ] {
                let settings = ChannelSettings {
                    name: name.to_string(),
                    prefix: format!("&7[{name}] "),
                    description: String::new(),
                    marker: marker.to_string(),
                    icon: Icon::Paper,
                    conditions: conditions.to_string(),
                };
                app.registry().register(app.build_channel(&settings));
            }
            Self { app, directory }
        }

        fn user(&self, name: &str) -> Arc<LocalRecipient> {
            let user = Arc::new(LocalRecipient::new(Uuid::new_v4(), name));
            self.directory.insert(user.clone());
            user
        }
    }

    #[tokio::test]
    async fn test_session_start_joins_usable_channels() {
        let fx = Fixture::new();
        let alice = fx.user("alice");

        fx.app.session_started(alice.id()).await.unwrap();

        let global = fx.app.registry().find("global").unwrap();
        let staff = fx.app.registry().find("staff").unwrap();
        assert!(global.is_listening(alice.id()));
        assert!(!staff.is_listening(alice.id()));

        let chatter = fx.app.chatter(alice.id()).unwrap();
        assert!(chatter.is_online());
        assert_eq!(chatter.active_channel().as_deref(), Some("Global"));
    }

    #[tokio::test]
    async fn test_session_end_leaves_channels_and_evicts() {
        let fx = Fixture::new();
        let alice = fx.user("alice");
        fx.app.session_started(alice.id()).await.unwrap();

        fx.app.session_ended(alice.id()).await.unwrap();

        assert!(fx.app.chatter(alice.id()).is_none());
        for channel in fx.app.registry().all() {
            assert!(!channel.is_listening(alice.id()));
        }
    }

    #[tokio::test]
    async fn test_state_survives_sessions() {
        let fx = Fixture::new();
        let alice = fx.user("alice");
        fx.app.session_started(alice.id()).await.unwrap();
        fx.app.command(alice.id(), "/channels join trade");
        fx.app.command(alice.id(), "/channels mute global");
        fx.app.session_ended(alice.id()).await.unwrap();

        fx.app.session_started(alice.id()).await.unwrap();
        let chatter = fx.app.chatter(alice.id()).unwrap();
        assert_eq!(chatter.active_channel().as_deref(), Some("Trade"));
        assert!(chatter.is_muted("global"));
        assert!(chatter.state().last_seen.is_some());
        assert!(!fx.app.registry().find("global").unwrap().is_listening(alice.id()));
    }

    #[tokio::test]
    async fn test_session_without_provider() {
        let directory = Arc::new(LocalDirectory::new());
        let app = ChatApp::new(directory.clone(), None);
        let alice = Arc::new(LocalRecipient::new(Uuid::new_v4(), "alice"));
        directory.insert(alice.clone());

        let result = app.session_started(alice.id()).await;
        assert!(matches!(result, Err(ChatError::NotFound(_))));
        assert_eq!(app.chat(alice.id(), "hello"), ChatOutcome::NoChatter);
    }

    #[tokio::test]
    async fn test_chat_to_active_channel() {
        let fx = Fixture::new();
        let alice = fx.user("alice");
        let bob = fx.user("bob");
        fx.app.session_started(alice.id()).await.unwrap();
        fx.app.session_started(bob.id()).await.unwrap();

        let outcome = fx.app.chat(alice.id(), "hello &aworld");
        match outcome {
            ChatOutcome::Delivered(report) => assert_eq!(report.delivered, 2),
            other => panic!("unexpected outcome: {other:?}"),
        }
        assert_eq!(bob.inbox_plain(), vec!["[Global] alice: hello world"]);
    }

    #[tokio::test]
    async fn test_chat_with_marker() {
        let fx = Fixture::new();
        let alice = fx.user("alice");
        fx.app.session_started(alice.id()).await.unwrap();

        let outcome = fx.app.chat(alice.id(), "$ selling apples");
        assert!(matches!(outcome, ChatOutcome::Delivered(_)));
        assert_eq!(alice.inbox_plain(), vec!["[Trade] alice: selling apples"]);
        // The active channel is unchanged
        let chatter = fx.app.chatter(alice.id()).unwrap();
        assert_eq!(chatter.active_channel().as_deref(), Some("Global"));
    }

    #[tokio::test]
    async fn test_chat_outcomes() {
        let fx = Fixture::new();
        let alice = fx.user("alice");

        assert_eq!(fx.app.chat(alice.id(), "hi"), ChatOutcome::NoChatter);

        fx.app.session_started(alice.id()).await.unwrap();
        assert_eq!(fx.app.chat(alice.id(), "#secret"), ChatOutcome::Denied);
        assert_eq!(fx.app.chat(alice.id(), "!   "), ChatOutcome::Empty);

        fx.app.chatter(alice.id()).unwrap().set_active_channel(None);
        assert_eq!(fx.app.chat(alice.id(), "hi"), ChatOutcome::NoChannel);
    }

    #[tokio::test]
    async fn test_warm_up_creates_offline_chatters() {
        let fx = Fixture::new();
        let alice = fx.user("alice");
        let bob = fx.user("bob");
        fx.app.session_started(bob.id()).await.unwrap();

        let loaded = fx.app.warm_up([alice.id(), bob.id()]).await;
        assert_eq!(loaded, 1);

        let chatter = fx.app.chatter(alice.id()).unwrap();
        assert!(!chatter.is_online());
        assert!(fx.app.chatter(bob.id()).unwrap().is_online());
        assert!(fx.app.registry().find("global").unwrap().is_listening(alice.id()));
    }

    #[tokio::test]
    async fn test_command_join_and_leave() {
        let fx = Fixture::new();
        let alice = fx.user("alice");
        fx.app.session_started(alice.id()).await.unwrap();

        assert_eq!(fx.app.command(alice.id(), "/channels join trade"), vec!["Joined Trade."]);
        let chatter = fx.app.chatter(alice.id()).unwrap();
        assert_eq!(chatter.active_channel().as_deref(), Some("Trade"));

        assert_eq!(fx.app.command(alice.id(), "/channels leave trade"), vec!["Left Trade."]);
        assert!(chatter.active_channel().is_none());
        assert_eq!(
            fx.app.command(alice.id(), "/channels leave trade"),
            vec!["You are not in Trade."]
        );
    }

    #[tokio::test]
    async fn test_command_join_denied_and_missing() {
        let fx = Fixture::new();
        let alice = fx.user("alice");
        fx.app.session_started(alice.id()).await.unwrap();

        assert_eq!(
            fx.app.command(alice.id(), "/channels join staff"),
            vec!["permission denied: cannot use channel 'Staff'"]
        );
        assert_eq!(
            fx.app.command(alice.id(), "/channels join nowhere"),
            vec!["channel 'nowhere' not found"]
        );
    }

    #[tokio::test]
    async fn test_command_mute_and_unmute() {
        let fx = Fixture::new();
        let alice = fx.user("alice");
        fx.app.session_started(alice.id()).await.unwrap();
        let global = fx.app.registry().find("global").unwrap();

        assert_eq!(fx.app.command(alice.id(), "/channels mute global"), vec!["Muted Global."]);
        assert!(!global.is_listening(alice.id()));
        assert!(fx.app.chatter(alice.id()).unwrap().active_channel().is_none());

        assert_eq!(
            fx.app.command(alice.id(), "/channels unmute global"),
            vec!["Unmuted Global."]
        );
        assert!(global.is_listening(alice.id()));
        assert_eq!(
            fx.app.command(alice.id(), "/channels unmute global"),
            vec!["Global is not muted."]
        );
    }

    #[tokio::test]
    async fn test_command_list() {
        let fx = Fixture::new();
        let alice = fx.user("alice");
        fx.app.session_started(alice.id()).await.unwrap();

        let lines = fx.app.command(alice.id(), "/channels list");
        assert_eq!(
            lines,
            vec!["=== Channels ===", "! Global [active]", "$ Trade"]
        );

        alice.grant("chat.staff");
        let lines = fx.app.command(alice.id(), "/channels list");
        assert!(lines.contains(&"# Staff".to_string()));
    }

    #[tokio::test]
    async fn test_command_create_requires_admin() {
        let fx = Fixture::new();
        let alice = fx.user("alice");
        fx.app.session_started(alice.id()).await.unwrap();

        let lines = fx.app.command(alice.id(), "/channels create Ops @ &4[O] group:ops");
        assert_eq!(
            lines,
            vec!["permission denied: hubbub.admin is required to create channels"]
        );
        assert!(fx.app.registry().find("ops").is_none());

        alice.grant(ADMIN_PERMISSION);
        let lines = fx.app.command(alice.id(), "/channels create Ops @ &4[O] group:ops; bogus:x");
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Unsupported condition 'bogus:x' denies everyone"));
        assert_eq!(lines[1], "Created channel Ops.");

        let ops = fx.app.registry().find("ops").unwrap();
        assert_eq!(ops.marker(), "@");
        assert_eq!(ops.conditions().len(), 2);
        assert!(ops.conditions()[1].is_unsupported());
        // Even the admin fails the stand-in condition
        alice.join_group("ops");
        assert!(!ops.can_use(alice.as_ref()));

        let lines = fx.app.command(alice.id(), "/channels create ops % &4[O]");
        assert_eq!(lines, vec!["Channel ops already exists."]);
    }

    #[tokio::test]
    async fn test_created_channel_attaches_connected_users() {
        let fx = Fixture::new();
        let admin = fx.user("admin");
        let bob = fx.user("bob");
        let carol = fx.user("carol");
        admin.grant(ADMIN_PERMISSION);
        for user in [&admin, &bob, &carol] {
            fx.app.session_started(user.id()).await.unwrap();
        }
        fx.app.chatter(carol.id()).unwrap().mute("lounge");

        let lines = fx.app.command(admin.id(), "/channels create Lounge ~ &d[L]");
        assert_eq!(lines, vec!["Created channel Lounge."]);

        let lounge = fx.app.registry().find("lounge").unwrap();
        assert!(lounge.is_listening(admin.id()));
        assert!(lounge.is_listening(bob.id()));
        assert!(!lounge.is_listening(carol.id()));

        fx.app.chat(bob.id(), "~ hi all");
        assert_eq!(admin.inbox_plain(), vec!["[L]bob: hi all"]);
        assert!(carol.inbox().is_empty());

        // Users failing the conditions stay out
        fx.app.command(admin.id(), "/channels create Vault % &8[V] perm:chat.vault");
        let vault = fx.app.registry().find("vault").unwrap();
        assert!(!vault.is_listening(bob.id()));
        assert!(!vault.is_listening(admin.id()));
    }

    #[tokio::test]
    async fn test_command_ignore_and_unignore() {
        let fx = Fixture::new();
        let alice = fx.user("alice");
        let bob = fx.user("bob");
        fx.app.session_started(alice.id()).await.unwrap();
        fx.app.session_started(bob.id()).await.unwrap();

        assert_eq!(fx.app.command(bob.id(), "/channels ignore Alice"), vec!["Ignoring Alice."]);
        assert_eq!(
            fx.app.command(bob.id(), &format!("/channels ignore {}", alice.id())),
            vec![format!("Already ignoring {}.", alice.id())]
        );
        assert!(fx.app.chatter(bob.id()).unwrap().is_ignoring(alice.id()));

        let ChatOutcome::Delivered(report) = fx.app.chat(alice.id(), "hello") else {
            panic!("expected delivery");
        };
        assert_eq!(report.delivered, 1);
        assert_eq!(report.ignored, 1);
        assert!(bob.inbox().is_empty());
        assert_eq!(alice.inbox_plain(), vec!["[Global] alice: hello"]);

        // Bob's own messages still reach alice
        fx.app.chat(bob.id(), "hi");
        assert_eq!(alice.inbox().len(), 2);

        assert_eq!(
            fx.app.command(bob.id(), "/channels unignore alice"),
            vec!["No longer ignoring alice."]
        );
        assert_eq!(
            fx.app.command(bob.id(), "/channels unignore alice"),
            vec!["You are not ignoring alice."]
        );
        fx.app.chat(alice.id(), "again");
        assert_eq!(bob.inbox_plain(), vec!["[Global] bob: hi", "[Global] alice: again"]);
    }

    #[tokio::test]
    async fn test_command_ignore_errors() {
        let fx = Fixture::new();
        let alice = fx.user("alice");
        fx.app.session_started(alice.id()).await.unwrap();

        assert_eq!(
            fx.app.command(alice.id(), "/channels ignore nobody"),
            vec!["user 'nobody' not found"]
        );
        assert_eq!(
            fx.app.command(alice.id(), "/channels ignore alice"),
            vec!["You cannot ignore yourself."]
        );
    }

    #[tokio::test]
    async fn test_session_ended_during_load_leaves_no_listener() {
        let fx = Fixture::new();
        let alice = fx.user("alice");

        let (started, ended) = tokio::join!(
            fx.app.session_started(alice.id()),
            fx.app.session_ended(alice.id())
        );
        started.unwrap();
        ended.unwrap();

        assert!(fx.app.chatter(alice.id()).is_none());
        for channel in fx.app.registry().all() {
            assert!(!channel.is_listening(alice.id()));
        }
    }

    #[tokio::test]
    async fn test_command_info() {
        let fx = Fixture::new();
        let alice = fx.user("alice");
        fx.app.session_started(alice.id()).await.unwrap();

        let lines = fx.app.command(alice.id(), "/channels info staff");
        assert_eq!(lines[0], "=== Staff ===");
        assert!(lines.contains(&"Marker: #".to_string()));
        assert!(lines.contains(&"Listeners: 0".to_string()));
        assert!(lines.contains(&"Conditions: permission:chat.staff".to_string()));
    }

    #[tokio::test]
    async fn test_command_unknown_shows_usage() {
        let fx = Fixture::new();
        let alice = fx.user("alice");

        let lines = fx.app.command(alice.id(), "/channels dance");
        assert_eq!(lines[0], "unknown subcommand 'dance'");
        assert_eq!(lines[1], "=== Channel commands ===");
    }

    #[test]
    fn test_command_from_unknown_sender() {
        let fx = Fixture::new();
        assert_eq!(
            fx.app.command(Uuid::new_v4(), "/channels list"),
            vec!["You are not connected."]
        );
    }
}
