use std::env;
use std::env::current_dir;
use std::fmt::Display;
use std::time::Duration;

use config::Config;
use config::ConfigError;
use secrecy::Secret;
use serde::Deserialize;
use serde_aux::field_attributes::deserialize_number_from_string;

use crate::dispatch::DispatchConfig;
use crate::domain::Sender;
use crate::email_client::EmailClient;

/// Global configuration, loaded from the yaml files under `configuration/`.
/// See `get_configuration`.
#[derive(Deserialize, Clone)]
pub struct Settings {
    pub provider: ProviderSettings,
    pub sender: SenderSettings,
    pub campaign: CampaignSettings,
    pub dispatch: DispatchConfig,
    pub output: OutputSettings,
}

/// Provider API endpoint and credential.
#[derive(Deserialize, Clone)]
pub struct ProviderSettings {
    pub base_url: String,
    pub authorization_token: Secret<String>,

    /// Transport-level request timeout; the engine imposes no other per-call
    /// deadline.
    #[serde(deserialize_with = "deserialize_number_from_string")]
    pub timeout_milliseconds: u64,
}

impl ProviderSettings {
    pub fn timeout(&self) -> Duration { Duration::from_millis(self.timeout_milliseconds) }

    /// The default client for this provider.
    pub fn client(&self) -> EmailClient {
        EmailClient::new(
            self.base_url.clone(),
            self.authorization_token.clone(),
            self.timeout(),
        )
    }

    /// Same endpoint, scoped credential; used when a campaign overrides the
    /// default with a domain-specific token.
    pub fn client_with_token(
        &self,
        token: Secret<String>,
    ) -> EmailClient {
        EmailClient::new(self.base_url.clone(), token, self.timeout())
    }
}

/// The sending identity; feeds the `%sender.*%` personalization tokens and
/// the provider `From` field.
#[derive(Deserialize, Clone)]
pub struct SenderSettings {
    pub name: String,
    pub email: String,
    pub title: String,
    pub profile_picture: String,
}

impl SenderSettings {
    pub fn sender(&self) -> Sender {
        Sender {
            name: self.name.clone(),
            email: self.email.clone(),
            title: self.title.clone(),
            profile_picture: self.profile_picture.clone(),
        }
    }
}

/// The campaign inputs. Interactive selection flows live outside this
/// binary; a run is fully described by configuration.
#[derive(Deserialize, Clone)]
pub struct CampaignSettings {
    pub contacts_path: String,
    pub template_path: String,
    pub subject: String,

    /// Human-entered schedule expression (see `schedule::parse`); absent
    /// sends immediately.
    pub schedule: Option<String>,
}

/// Where the post-run result artifacts land.
#[derive(Deserialize, Clone)]
pub struct OutputSettings {
    pub sent_report: String,
    pub failed_report: String,
}

pub enum Environment {
    Local,
    Production,
}

impl Display for Environment {
    fn fmt(
        &self,
        f: &mut std::fmt::Formatter<'_>,
    ) -> std::fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Environment::Local => "local",
                Environment::Production => "production",
            }
        )?;
        Ok(())
    }
}

impl TryFrom<String> for Environment {
    type Error = String;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        match value.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "production" => Ok(Self::Production),
            e => Err(format!("Invalid: {e}")),
        }
    }
}

/// Load yaml configuration files at `<project_root>/configuration`.
///
/// All fields without a serde default must be present, otherwise
/// initialisation fails immediately and nothing is sent. Env vars with the
/// `APP` prefix override file values, e.g.
/// `APP_PROVIDER__AUTHORIZATION_TOKEN` -> `Settings.provider.authorization_token`.
pub fn get_configuration() -> Result<Settings, ConfigError> {
    let cfg_dir = current_dir()
        .expect("could not get current dir")
        .join("configuration");

    let env: Environment = env::var("APP_ENVIRONMENT")
        .unwrap_or("local".to_string())
        .try_into()
        .expect("could not initiate Environment struct");

    let settings = Config::builder()
        .add_source(config::File::from(cfg_dir.join("base.yaml")))
        .add_source(config::File::from(cfg_dir.join(format!("{env}.yaml"))))
        .add_source(
            config::Environment::with_prefix("APP")
                .prefix_separator("_")
                .separator("__"),
        )
        .build()?;

    settings.try_deserialize::<Settings>()
}
