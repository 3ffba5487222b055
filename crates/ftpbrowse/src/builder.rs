use std::time::Duration;

use crate::{
    ServerProfile,
    profile::{default_passive, default_port, default_root_path, default_timeout_secs},
};

pub struct ServerProfileBuilder {
    profile: ServerProfile,
}

impl ServerProfileBuilder {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            profile: ServerProfile {
                name: None,
                host: host.into(),
                port: default_port(),
                username: String::new(),
                password: String::new(),
                root_path: default_root_path(),
                passive: default_passive(),
                timeout_secs: default_timeout_secs(),
            },
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.profile.name = Some(name.into());
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.profile.port = port;
        self
    }

    pub fn credentials(mut self, username: impl Into<String>, password: impl Into<String>) -> Self {
        self.profile.username = username.into();
        self.profile.password = password.into();
        self
    }

    pub fn root_path(mut self, root_path: impl Into<String>) -> Self {
        self.profile.root_path = root_path.into();
        self
    }

    pub fn passive(mut self, passive: bool) -> Self {
        self.profile.passive = passive;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.profile.timeout_secs = timeout.as_secs();
        self
    }

    pub fn build(self) -> ServerProfile {
        self.profile
    }
}
