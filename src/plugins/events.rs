// src/plugins/events.rs — Lifecycle events broadcast to plugins

use std::sync::Arc;

use crate::space::{Application, Space};

/// The entity an event is about.
#[derive(Clone)]
pub enum EventTarget {
    Space(Arc<Space>),
    Application {
        space: Arc<Space>,
        app: Arc<Application>,
    },
}

impl EventTarget {
    pub fn space(&self) -> &Arc<Space> {
        match self {
            EventTarget::Space(space) => space,
            EventTarget::Application { space, .. } => space,
        }
    }

    pub fn application(&self) -> Option<&Arc<Application>> {
        match self {
            EventTarget::Space(_) => None,
            EventTarget::Application { app, .. } => Some(app),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Create,
    Start,
    Stop,
    AddFeature,
    DeleteFeature,
}

impl EventKind {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Create => "create",
            Self::Start => "start",
            Self::Stop => "stop",
            Self::AddFeature => "add_feature",
            Self::DeleteFeature => "delete_feature",
        }
    }
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Clone)]
pub enum Event {
    Create(EventTarget),
    Start(EventTarget),
    Stop(EventTarget),
    /// A binding was added to (or replaced in) a space.
    AddFeature {
        space: Arc<Space>,
        kind: String,
        name: String,
        provider: String,
        overwrite: bool,
    },
    /// A binding was removed from a space. `provider` is the one it pointed at.
    DeleteFeature {
        space: Arc<Space>,
        kind: String,
        name: String,
        provider: String,
    },
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::Create(_) => EventKind::Create,
            Event::Start(_) => EventKind::Start,
            Event::Stop(_) => EventKind::Stop,
            Event::AddFeature { .. } => EventKind::AddFeature,
            Event::DeleteFeature { .. } => EventKind::DeleteFeature,
        }
    }

    pub fn space(&self) -> &Arc<Space> {
        match self {
            Event::Create(t) | Event::Start(t) | Event::Stop(t) => t.space(),
            Event::AddFeature { space, .. } | Event::DeleteFeature { space, .. } => space,
        }
    }

    /// Provider a feature event concerns, if any.
    pub fn provider(&self) -> Option<&str> {
        match self {
            Event::AddFeature { provider, .. } | Event::DeleteFeature { provider, .. } => {
                Some(provider)
            }
            _ => None,
        }
    }
}

impl std::fmt::Debug for Event {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Event")
            .field("kind", &self.kind())
            .field("space", &self.space().namespace())
            .field("provider", &self.provider())
            .finish()
    }
}
