pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Clone, Debug, Default)]
pub enum Auth {
    #[default]
    None,
    Bearer(String),
    Basic {
        user: String,
        password: String,
    },
}

#[derive(Clone, Debug)]
pub struct Config {
    pub timeout_secs: u64,
    pub auth: Auth,
    pub verify_tls: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            auth: Auth::None,
            verify_tls: true,
        }
    }
}

impl Config {
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn with_bearer_token(mut self, token: &str) -> Self {
        self.auth = Auth::Bearer(token.to_string());
        self
    }

    pub fn with_basic_auth(mut self, user: &str, password: &str) -> Self {
        self.auth = Auth::Basic {
            user: user.to_string(),
            password: password.to_string(),
        };
        self
    }

    pub fn without_tls_verification(mut self) -> Self {
        self.verify_tls = false;
        self
    }
}
