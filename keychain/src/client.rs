//! Host-side entry point to the keychain.

use kc_channel::{ChannelRegistry, MessageChannel, WindowHandle};
use once_cell::sync::OnceCell;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

use crate::account::{AccountError, RemoteAccount, RpcCaller};
use crate::config::ClientConfig;
use crate::rpc::{ConnectParams, ConnectResult, ProbeResult, Request, Scope};

/// Opens the sized authorization window.
pub trait PopupOpener: Send + Sync {
    fn open(&self, url: &Url, features: &str) -> Result<(), String>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientOptions {
    pub keychain_url: Url,
    pub popup_width: u32,
    pub popup_height: u32,
    /// Deadline for non-interactive requests. `connect` always waits for the
    /// user.
    pub request_deadline: Option<Duration>,
}

impl TryFrom<&ClientConfig> for ClientOptions {
    type Error = url::ParseError;

    fn try_from(config: &ClientConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            keychain_url: Url::parse(&config.keychain_url)?,
            popup_width: config.popup_width,
            popup_height: config.popup_height,
            request_deadline: config.request_deadline(),
        })
    }
}

/// Connects the host window to the keychain frame.
///
/// The channel to the frame is created on first use and reused afterwards.
pub struct Client {
    registry: Arc<ChannelRegistry>,
    frame: WindowHandle,
    popup: Arc<dyn PopupOpener>,
    options: ClientOptions,
    channel: OnceCell<MessageChannel>,
    account: Mutex<Option<RemoteAccount>>,
}

impl Client {
    pub fn new(
        registry: Arc<ChannelRegistry>,
        frame: WindowHandle,
        popup: Arc<dyn PopupOpener>,
        options: ClientOptions,
    ) -> Self {
        Self {
            registry,
            frame,
            popup,
            options,
            channel: OnceCell::new(),
            account: Mutex::new(None),
        }
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// The connected account, if any.
    pub fn account(&self) -> Option<RemoteAccount> {
        self.account.lock().clone()
    }

    fn channel(&self) -> &MessageChannel {
        self.channel
            .get_or_init(|| MessageChannel::new(self.registry.clone(), self.frame.clone()))
    }

    fn caller(&self) -> RpcCaller {
        RpcCaller::new(
            self.channel().clone(),
            self.registry.window().origin(),
            self.options.request_deadline,
        )
    }

    /// Connect to the keychain.
    ///
    /// A silent `probe` runs first; an existing session is reused without any
    /// user interaction. Otherwise the authorization popup is opened with the
    /// requested `scopes` and the call waits, without deadline, for the user
    /// to approve or reject.
    pub async fn connect(&self, scopes: Vec<Scope>) -> Result<RemoteAccount, AccountError> {
        let caller = self.caller();

        match caller.call::<ProbeResult>(Request::Probe).await {
            Ok(ProbeResult {
                address: Some(address),
            }) => {
                info!(%address, "reconnected to existing keychain session");
                return Ok(self.remember(address, caller));
            }
            Ok(ProbeResult { address: None }) => debug!("no existing keychain session"),
            Err(AccountError::Remote(error)) => {
                debug!(%error, "probe rejected, falling back to popup")
            }
            Err(e) => return Err(e),
        }

        let url = self.connect_url(&scopes)?;
        self.popup
            .open(&url, &self.popup_features())
            .map_err(AccountError::Popup)?;
        debug!(%url, "authorization popup opened");

        let result: ConnectResult = caller
            .call_with_deadline(Request::Connect(ConnectParams { scopes }), None)
            .await?;
        info!(address = %result.address, "connected to keychain");
        Ok(self.remember(result.address, caller))
    }

    /// End the keychain session and forget the account.
    pub async fn disconnect(&self) -> Result<(), AccountError> {
        self.caller().call::<()>(Request::Disconnect).await?;
        if let Some(account) = self.account.lock().take() {
            info!(address = account.address(), "disconnected from keychain");
        }
        Ok(())
    }

    /// `<keychain_url>/connect?origin=<origin>&scopes=<json>`
    pub fn connect_url(&self, scopes: &[Scope]) -> Result<Url, AccountError> {
        let mut url = self.options.keychain_url.clone();
        url.path_segments_mut()
            .map_err(|_| AccountError::Popup("keychain url cannot be a base".to_string()))?
            .pop_if_empty()
            .push("connect");
        url.query_pairs_mut()
            .append_pair("origin", self.registry.window().origin())
            .append_pair("scopes", &serde_json::to_string(scopes)?);
        Ok(url)
    }

    fn popup_features(&self) -> String {
        format!(
            "height={},width={}",
            self.options.popup_height, self.options.popup_width
        )
    }

    fn remember(&self, address: String, caller: RpcCaller) -> RemoteAccount {
        let account = RemoteAccount::new(address, caller);
        *self.account.lock() = Some(account.clone());
        account
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::rpc::ResponsePayload;
    use async_trait::async_trait;
    use kc_channel::{RequestHandler, WindowContext};
    use serde_json::Value;

    /// A keychain frame with no stored session.
    struct NoSession;

    #[async_trait]
    impl RequestHandler for NoSession {
        async fn handle(&self, _payload: Value, _origin: &str) -> Value {
            serde_json::to_value(ResponsePayload::ok(
                "https://x.cartridge.gg",
                serde_json::json!({}),
            ))
            .unwrap()
        }
    }

    struct NoPopup;

    impl PopupOpener for NoPopup {
        fn open(&self, _: &Url, _: &str) -> Result<(), String> {
            Err("popups blocked".to_string())
        }
    }

    fn client(url: &str) -> (Client, WindowContext) {
        let host = ChannelRegistry::install(WindowContext::open("https://game.example"));
        let frame = WindowContext::open("https://x.cartridge.gg");
        let options = ClientOptions {
            keychain_url: Url::parse(url).unwrap(),
            ..ClientOptions::try_from(&ClientConfig::default()).unwrap()
        };
        let client = Client::new(host, frame.handle(), Arc::new(NoPopup), options);
        (client, frame)
    }

    #[tokio::test]
    async fn test_connect_url() {
        let (client, _frame) = client("https://x.cartridge.gg");
        let url = client
            .connect_url(&[Scope::with_method("0x1", "transfer")])
            .unwrap();

        assert_eq!(url.path(), "/connect");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert_eq!(
            pairs,
            vec![
                ("origin".to_string(), "https://game.example".to_string()),
                (
                    "scopes".to_string(),
                    r#"[{"target":"0x1","method":"transfer"}]"#.to_string()
                ),
            ]
        );
    }

    #[tokio::test]
    async fn test_connect_url_keeps_base_path() {
        let (client, _frame) = client("https://keychain.example/v2/");
        let url = client.connect_url(&[]).unwrap();
        assert_eq!(url.path(), "/v2/connect");
    }

    #[tokio::test]
    async fn test_default_options() {
        let options = ClientOptions::try_from(&ClientConfig::default()).unwrap();
        assert_eq!(options.keychain_url.as_str(), "https://x.cartridge.gg/");
        assert_eq!(options.popup_width, 400);
        assert_eq!(options.popup_height, 650);
        assert_eq!(options.request_deadline, None);

        let (client, _frame) = client("https://x.cartridge.gg");
        assert_eq!(client.popup_features(), "height=650,width=400");
        assert!(client.account().is_none());
    }

    #[tokio::test]
    async fn test_connect_reports_blocked_popup() {
        let host = ChannelRegistry::install(WindowContext::open("https://game.example"));
        let frame = ChannelRegistry::install(WindowContext::open("https://x.cartridge.gg"));
        frame.set_handler(Arc::new(NoSession));
        let options = ClientOptions::try_from(&ClientConfig::default()).unwrap();
        let client = Client::new(host.clone(), frame.window().clone(), Arc::new(NoPopup), options);

        match client.connect(vec![Scope::with_method("0x1", "transfer")]).await {
            Err(AccountError::Popup(reason)) => assert_eq!(reason, "popups blocked"),
            other => panic!("expected popup error, got {:?}", other.map(|a| a.address().to_string())),
        }
        assert!(client.account().is_none());
        assert_eq!(host.pending_count(), 0);
    }

    #[test]
    fn test_invalid_keychain_url() {
        let config = ClientConfig {
            keychain_url: "not a url".to_string(),
            ..ClientConfig::default()
        };
        assert!(ClientOptions::try_from(&config).is_err());
    }
}
