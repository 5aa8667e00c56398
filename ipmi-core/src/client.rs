//! The IPMI client — connection lifecycle and the request/response
//! dispatcher.
//!
//! A `Client` owns one transport and at most one session. Lifecycle is
//! `connect → exchange* → close`; a client serves one logical caller,
//! and a concurrent `exchange` on the same client fails fast with
//! [`IpmiError::Busy`] instead of queueing.
//!
//! Every suspension point (connect, send, receive, retry backoff)
//! honours the caller's [`CancellationToken`].

use std::future::Future;
use std::net::SocketAddr;
use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use crate::codec::{Request, Response};
use crate::error::IpmiError;
use crate::message::{CC_OK, CommandId, Message, PrivilegeLevel, completion_code_description};
use crate::session::crypto::{AuthAlgorithm, CipherSuite, auth_hmac, derive_k, derive_sik, rakp4_icv};
use crate::session::rakp::{
    OpenSessionRequest, OpenSessionResponse, Rakp1, Rakp2, Rakp3, Rakp4, rakp2_hmac_input,
    rakp3_hmac_input, rakp4_hmac_input, rakp_status_description, role_byte,
};
use crate::session::rmcp::{
    AuthType, CLASS_ASF, CLASS_IPMI, IpmbReply, is_presence_pong, pack_ipmb, pack_v15,
    presence_ping, strip_rmcp, unpack_ipmb, unpack_v15, wrap_rmcp,
};
use crate::session::{
    PayloadType, Session, SessionKeys, SessionPhase, pack_rmcp_plus_sessionless, unpack_rmcp_plus,
};
use crate::commands::app::{GetChannelAuthCapsRequest, GetChannelAuthCapsResponse};
use crate::commands::{CloseSessionRequest, SetSessionPrivilegeLevelRequest};
use crate::transport::{Transport, UdpTransport, udp::DEFAULT_PORT};

/// Delay between retransmission attempts.
const RETRY_BACKOFF: Duration = Duration::from_millis(100);

// ── Configuration ────────────────────────────────────────────────

/// Everything a [`Client`] needs to reach and authenticate with a BMC.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    /// Optional BMC key; defaults to the user password in RAKP key
    /// derivation when absent.
    pub kg: Option<Vec<u8>>,
    pub privilege_level: PrivilegeLevel,
    pub cipher_suite_id: u8,
    /// Per-attempt I/O timeout.
    pub attempt_timeout: Duration,
    /// Overall deadline for one command exchange.
    pub command_timeout: Duration,
    /// Overall deadline for session establishment (RAKP round-trips).
    pub session_timeout: Duration,
    /// Retransmissions after the first attempt.
    pub retries: u32,
}

impl ClientConfig {
    pub fn new(
        host: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            host: host.into(),
            port: DEFAULT_PORT,
            username: username.into(),
            password: password.into(),
            kg: None,
            privilege_level: PrivilegeLevel::Administrator,
            cipher_suite_id: 3,
            attempt_timeout: Duration::from_secs(2),
            command_timeout: Duration::from_secs(10),
            session_timeout: Duration::from_secs(20),
            retries: 2,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_privilege_level(mut self, level: PrivilegeLevel) -> Self {
        self.privilege_level = level;
        self
    }

    pub fn with_cipher_suite(mut self, id: u8) -> Self {
        self.cipher_suite_id = id;
        self
    }

    pub fn with_kg(mut self, kg: Vec<u8>) -> Self {
        self.kg = Some(kg);
        self
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = timeout;
        self
    }

    pub fn with_command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = timeout;
        self
    }

    pub fn with_session_timeout(mut self, timeout: Duration) -> Self {
        self.session_timeout = timeout;
        self
    }

    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }
}

// ── Client ───────────────────────────────────────────────────────

/// A connection to one BMC. See the module docs for the lifecycle.
pub struct Client {
    config: ClientConfig,
    inner: Mutex<Inner>,
}

struct Inner {
    transport: Option<Box<dyn Transport>>,
    phase: SessionPhase,
    session: Option<Session>,
    /// 6-bit IPMB requester sequence, incremented per message.
    seq: u8,
}

impl Client {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                transport: None,
                phase: SessionPhase::default(),
                session: None,
                seq: 0,
            }),
        }
    }

    /// Build a client over an externally constructed transport. This is
    /// the seam for system interfaces and for the scripted mock; such
    /// transports carry session-less traffic only.
    pub fn with_transport(config: ClientConfig, transport: Box<dyn Transport>) -> Self {
        Self {
            config,
            inner: Mutex::new(Inner {
                transport: Some(transport),
                phase: SessionPhase::default(),
                session: None,
                seq: 0,
            }),
        }
    }

    /// Open the UDP transport and establish an RMCP+ session: presence
    /// ping, capability discovery, Open Session, and the RAKP 1-4
    /// exchange.
    pub async fn connect(&self, cancel: &CancellationToken) -> Result<(), IpmiError> {
        let mut inner = self.inner.try_lock().map_err(|_| IpmiError::Busy)?;
        let deadline = Instant::now() + self.config.session_timeout;

        let addr = resolve(&self.config.host, self.config.port).await?;
        inner.transport = Some(Box::new(UdpTransport::connect(addr).await?));

        match inner.establish(&self.config, cancel, deadline).await {
            Ok(()) => Ok(()),
            Err(e) => {
                inner.teardown().await;
                Err(e)
            }
        }
    }

    /// Issue one command: pack the request, run the retry/timeout loop,
    /// interpret the completion code, and unpack the response body.
    pub async fn exchange<R, S>(
        &self,
        cancel: &CancellationToken,
        req: &R,
        res: &mut S,
    ) -> Result<(), IpmiError>
    where
        R: Request,
        S: Response,
    {
        let mut inner = self.inner.try_lock().map_err(|_| IpmiError::Busy)?;
        let deadline = Instant::now() + self.config.command_timeout;

        let command = req.command();
        let body = req.pack();
        let reply = match inner
            .exchange_message(&self.config, cancel, deadline, command, &body)
            .await
        {
            Ok(reply) => reply,
            Err(e @ IpmiError::IntegrityFailure(_)) => {
                // Session-layer failures close the session before
                // surfacing.
                inner.teardown().await;
                return Err(e);
            }
            Err(e) => return Err(e),
        };

        if reply.completion_code != CC_OK {
            let description = res
                .completion_codes()
                .iter()
                .find(|(cc, _)| *cc == reply.completion_code)
                .map(|(_, d)| *d)
                .unwrap_or_else(|| completion_code_description(reply.completion_code));
            return Err(IpmiError::CompletionCode {
                cc: reply.completion_code,
                description,
            });
        }
        res.unpack(&reply.data)
    }

    /// Close the session (best effort) and drop the transport. Derived
    /// keys are zeroised regardless of whether the BMC acknowledges.
    pub async fn close(&self) -> Result<(), IpmiError> {
        let mut inner = self.inner.try_lock().map_err(|_| IpmiError::Busy)?;

        let session_id = inner.session.as_ref().map(|s| s.bmc_session_id);
        if let Some(session_id) = session_id {
            let close_req = CloseSessionRequest { session_id };
            let command = close_req.command();
            let body = close_req.pack();
            let deadline = Instant::now() + self.config.attempt_timeout;
            let cancel = CancellationToken::new();
            if let Err(e) = inner
                .exchange_message(&self.config, &cancel, deadline, command, &body)
                .await
            {
                warn!("close session not acknowledged: {e}");
            }
        }
        inner.teardown().await;
        Ok(())
    }

    /// Current session phase (diagnostic).
    pub fn phase(&self) -> SessionPhase {
        match self.inner.try_lock() {
            Ok(inner) => inner.phase.clone(),
            Err(_) => SessionPhase::Closed,
        }
    }
}

impl Inner {
    /// Drop session and transport, zeroising key material.
    async fn teardown(&mut self) {
        if let Some(mut session) = self.session.take() {
            session.zeroise_keys();
        }
        if let Some(mut transport) = self.transport.take() {
            let _ = transport.close().await;
        }
        self.phase.close();
    }

    // ── Dispatcher core ──────────────────────────────────────────

    /// Send one IPMI message and wait for its matching reply, retrying
    /// transient failures within the overall deadline.
    async fn exchange_message(
        &mut self,
        cfg: &ClientConfig,
        cancel: &CancellationToken,
        deadline: Instant,
        command: CommandId,
        body: &[u8],
    ) -> Result<IpmbReply, IpmiError> {
        let Self {
            transport,
            session,
            seq,
            ..
        } = self;
        let transport = transport.as_mut().ok_or(IpmiError::NotConnected)?;

        let msg_seq = *seq;
        *seq = (*seq + 1) & 0x3F;

        let expected_netfn = command.netfn.response_value();
        let msg = Message::request(command, body.to_vec());
        let ipmb = pack_ipmb(msg.netfn, 0, msg_seq, msg.cmd, &msg.data);

        let mut last_err = IpmiError::Timeout(cfg.command_timeout);
        for attempt in 0..=cfg.retries {
            if attempt > 0 {
                trace!("retry {attempt} for {command}");
                with_cancel(cancel, tokio::time::sleep(RETRY_BACKOFF)).await?;
            }

            // Fresh session wrapper per attempt: each retransmission
            // consumes its own session sequence number and IV.
            let session_bytes = match session.as_mut() {
                Some(active) => active.encode_ipmi(&ipmb)?,
                None => pack_v15(AuthType::None, 0, 0, b"", &ipmb),
            };
            let frame = wrap_rmcp(CLASS_IPMI, &session_bytes);

            if let Err(e) = with_cancel(cancel, transport.send(&frame)).await? {
                if e.is_transient() {
                    last_err = e;
                    continue;
                }
                return Err(e);
            }

            let attempt_deadline = Instant::now() + cfg.attempt_timeout;
            loop {
                let now = Instant::now();
                if now >= deadline {
                    return Err(IpmiError::Timeout(cfg.command_timeout));
                }
                let Some(remaining) = attempt_deadline
                    .min(deadline)
                    .checked_duration_since(now)
                    .filter(|d| !d.is_zero())
                else {
                    last_err = IpmiError::Timeout(cfg.attempt_timeout);
                    break;
                };

                let datagram = match with_cancel(cancel, transport.recv(remaining)).await? {
                    Ok(datagram) => datagram,
                    Err(e) if e.is_transient() => {
                        last_err = e;
                        break;
                    }
                    Err(e) => return Err(e),
                };

                match decode_reply(session, &datagram, msg_seq, expected_netfn, command.cmd) {
                    Ok(reply) => return Ok(reply),
                    Err(e @ IpmiError::IntegrityFailure(_)) => return Err(e),
                    Err(e) => {
                        // Mismatched or malformed datagram: drop it and
                        // keep waiting for the real reply.
                        trace!("dropping datagram: {e}");
                        continue;
                    }
                }
            }
        }
        Err(last_err)
    }

    // ── Session establishment ────────────────────────────────────

    async fn establish(
        &mut self,
        cfg: &ClientConfig,
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> Result<(), IpmiError> {
        let suite = CipherSuite::from_id(cfg.cipher_suite_id)?;

        // 1. ASF presence ping.
        self.discover_presence(cfg, cancel, deadline).await?;
        self.phase.detect_presence()?;

        // 2. Channel authentication capabilities (session-less).
        let caps_req = GetChannelAuthCapsRequest {
            privilege_level: cfg.privilege_level,
            ..Default::default()
        };
        let command = caps_req.command();
        let body = caps_req.pack();
        let reply = self
            .exchange_message(cfg, cancel, deadline, command, &body)
            .await?;
        if reply.completion_code != CC_OK {
            return Err(IpmiError::CompletionCode {
                cc: reply.completion_code,
                description: completion_code_description(reply.completion_code),
            });
        }
        let mut caps = GetChannelAuthCapsResponse::default();
        caps.unpack(&reply.data)?;
        if !caps.ipmi_v2_supported && !caps.extended_capabilities {
            return Err(IpmiError::AuthenticationFailure(
                "BMC does not offer IPMI v2.0/RMCP+ on this channel",
            ));
        }
        self.phase.learn_auth_caps()?;

        // 3. Open Session.
        let console_session_id: u32 = rand::random::<u32>() | 1;
        let open_req = OpenSessionRequest {
            message_tag: 0x00,
            requested_privilege: cfg.privilege_level,
            console_session_id,
            cipher_suite: suite,
        };
        let payload = self
            .session_payload_exchange(
                cfg,
                cancel,
                deadline,
                PayloadType::OpenSessionRequest,
                open_req.pack(),
                PayloadType::OpenSessionResponse,
            )
            .await?;
        let open_res = OpenSessionResponse::unpack(&payload)?;
        if open_res.status != 0x00 {
            return Err(IpmiError::AuthenticationFailure(rakp_status_description(
                open_res.status,
            )));
        }
        if open_res.console_session_id != console_session_id {
            return Err(IpmiError::AuthenticationFailure(
                "open session response for a different console session",
            ));
        }
        if !open_res.matches_suite(&suite) {
            return Err(IpmiError::AuthenticationFailure(
                "BMC selected different algorithms than proposed",
            ));
        }
        let bmc_session_id = open_res.bmc_session_id;
        self.phase.ack_open_session()?;
        debug!(
            "open session acked: console {console_session_id:#010x}, bmc {bmc_session_id:#010x}, suite {}",
            suite.id
        );

        // 4. RAKP 1 / 2.
        let console_random: [u8; 16] = rand::random();
        let role = role_byte(cfg.privilege_level);
        let username = cfg.username.as_bytes().to_vec();
        let password = cfg.password.as_bytes();

        let rakp1 = Rakp1 {
            message_tag: 0x01,
            bmc_session_id,
            console_random,
            role,
            username: username.clone(),
        };
        let payload = self
            .session_payload_exchange(
                cfg,
                cancel,
                deadline,
                PayloadType::Rakp1,
                rakp1.pack(),
                PayloadType::Rakp2,
            )
            .await?;
        let rakp2 = Rakp2::unpack(&payload)?;
        if rakp2.status != 0x00 {
            return Err(IpmiError::AuthenticationFailure(rakp_status_description(
                rakp2.status,
            )));
        }
        if rakp2.console_session_id != console_session_id {
            return Err(IpmiError::AuthenticationFailure(
                "RAKP 2 for a different console session",
            ));
        }
        if suite.auth != AuthAlgorithm::None {
            let expected = auth_hmac(
                suite.auth,
                password,
                &rakp2_hmac_input(
                    console_session_id,
                    bmc_session_id,
                    &console_random,
                    &rakp2.bmc_random,
                    &rakp2.bmc_guid,
                    role,
                    &username,
                ),
            );
            if expected != rakp2.key_exchange_auth_code {
                return Err(IpmiError::AuthenticationFailure(
                    "RAKP 2 key exchange code mismatch (bad password?)",
                ));
            }
        }
        self.phase.verify_rakp2()?;

        // 5. RAKP 3 / 4 and key derivation.
        let rakp3_code = auth_hmac(
            suite.auth,
            password,
            &rakp3_hmac_input(&rakp2.bmc_random, console_session_id, role, &username),
        );
        let rakp3 = Rakp3 {
            message_tag: 0x02,
            status: 0x00,
            bmc_session_id,
            key_exchange_auth_code: rakp3_code,
        };

        let kg: &[u8] = cfg.kg.as_deref().unwrap_or(password);
        let sik = derive_sik(
            suite.auth,
            kg,
            &console_random,
            &rakp2.bmc_random,
            role,
            &username,
        );
        let keys = SessionKeys {
            k1: derive_k(suite.auth, &sik, 0x01),
            k2: derive_k(suite.auth, &sik, 0x02),
            sik,
        };

        let payload = self
            .session_payload_exchange(
                cfg,
                cancel,
                deadline,
                PayloadType::Rakp3,
                rakp3.pack(),
                PayloadType::Rakp4,
            )
            .await?;
        self.phase.send_rakp3()?;

        let rakp4 = Rakp4::unpack(&payload)?;
        if rakp4.status != 0x00 {
            return Err(IpmiError::AuthenticationFailure(rakp_status_description(
                rakp4.status,
            )));
        }
        if rakp4.console_session_id != console_session_id {
            return Err(IpmiError::AuthenticationFailure(
                "RAKP 4 for a different console session",
            ));
        }
        if suite.auth != AuthAlgorithm::None {
            let expected = rakp4_icv(
                suite.auth,
                &keys.sik,
                &rakp4_hmac_input(&console_random, bmc_session_id, &rakp2.bmc_guid),
            );
            if expected != rakp4.integrity_check_value {
                return Err(IpmiError::AuthenticationFailure(
                    "RAKP 4 integrity check value mismatch",
                ));
            }
        }

        self.phase.activate()?;
        self.session = Some(Session::new(
            console_session_id,
            bmc_session_id,
            suite,
            cfg.privilege_level,
            keys,
        ));
        debug!("session active");

        // 6. Raise the operating privilege to the requested level.
        let priv_req = SetSessionPrivilegeLevelRequest {
            privilege_level: cfg.privilege_level,
        };
        let command = priv_req.command();
        let body = priv_req.pack();
        let reply = self
            .exchange_message(cfg, cancel, deadline, command, &body)
            .await?;
        if reply.completion_code != CC_OK {
            return Err(IpmiError::CompletionCode {
                cc: reply.completion_code,
                description: completion_code_description(reply.completion_code),
            });
        }
        Ok(())
    }

    /// Transmit an ASF Presence Ping and wait for the pong.
    async fn discover_presence(
        &mut self,
        cfg: &ClientConfig,
        cancel: &CancellationToken,
        deadline: Instant,
    ) -> Result<(), IpmiError> {
        let transport = self.transport.as_mut().ok_or(IpmiError::NotConnected)?;
        let tag = rand::random::<u8>();
        let ping = presence_ping(tag);

        let mut last_err = IpmiError::Timeout(cfg.attempt_timeout);
        for attempt in 0..=cfg.retries {
            if attempt > 0 {
                with_cancel(cancel, tokio::time::sleep(RETRY_BACKOFF)).await?;
            }
            with_cancel(cancel, transport.send(&ping)).await??;

            let attempt_deadline = Instant::now() + cfg.attempt_timeout;
            loop {
                let now = Instant::now();
                let Some(remaining) = attempt_deadline
                    .min(deadline)
                    .checked_duration_since(now)
                    .filter(|d| !d.is_zero())
                else {
                    last_err = IpmiError::Timeout(cfg.attempt_timeout);
                    break;
                };
                match with_cancel(cancel, transport.recv(remaining)).await? {
                    Ok(frame) if is_presence_pong(&frame, tag) => return Ok(()),
                    Ok(_) => continue,
                    Err(e) if e.is_transient() => {
                        last_err = e;
                        break;
                    }
                    Err(e) => return Err(e),
                }
            }
            if Instant::now() >= deadline {
                break;
            }
        }
        Err(last_err)
    }

    /// One session-establishment round trip: wrap `payload` in a
    /// session-less RMCP+ header, send, and wait for the payload type
    /// the ladder expects next.
    async fn session_payload_exchange(
        &mut self,
        cfg: &ClientConfig,
        cancel: &CancellationToken,
        deadline: Instant,
        send_type: PayloadType,
        payload: Vec<u8>,
        expect_type: PayloadType,
    ) -> Result<Vec<u8>, IpmiError> {
        let transport = self.transport.as_mut().ok_or(IpmiError::NotConnected)?;
        let frame = wrap_rmcp(CLASS_IPMI, &pack_rmcp_plus_sessionless(send_type, &payload));

        let mut last_err = IpmiError::Timeout(cfg.attempt_timeout);
        for attempt in 0..=cfg.retries {
            if attempt > 0 {
                with_cancel(cancel, tokio::time::sleep(RETRY_BACKOFF)).await?;
            }
            with_cancel(cancel, transport.send(&frame)).await??;

            let attempt_deadline = Instant::now() + cfg.attempt_timeout;
            loop {
                let now = Instant::now();
                if now >= deadline {
                    return Err(IpmiError::Timeout(cfg.session_timeout));
                }
                let Some(remaining) = attempt_deadline
                    .min(deadline)
                    .checked_duration_since(now)
                    .filter(|d| !d.is_zero())
                else {
                    last_err = IpmiError::Timeout(cfg.attempt_timeout);
                    break;
                };

                let datagram = match with_cancel(cancel, transport.recv(remaining)).await? {
                    Ok(datagram) => datagram,
                    Err(e) if e.is_transient() => {
                        last_err = e;
                        break;
                    }
                    Err(e) => return Err(e),
                };

                let Ok((class, body)) = strip_rmcp(&datagram) else {
                    continue;
                };
                if class == CLASS_ASF {
                    continue; // stray pong
                }
                match unpack_rmcp_plus(body) {
                    Ok(frame) if frame.payload_type == expect_type => {
                        return Ok(frame.payload);
                    }
                    Ok(other) => {
                        trace!("dropping handshake payload {:?}", other.payload_type);
                        continue;
                    }
                    Err(e) => {
                        trace!("dropping malformed handshake frame: {e}");
                        continue;
                    }
                }
            }
        }
        Err(last_err)
    }
}

// ── Helpers ──────────────────────────────────────────────────────

/// Race a future against the cancellation token.
async fn with_cancel<F>(cancel: &CancellationToken, fut: F) -> Result<F::Output, IpmiError>
where
    F: Future,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(IpmiError::Cancelled),
        out = fut => Ok(out),
    }
}

/// Decode one inbound datagram and match it against the outstanding
/// request. Any mismatch (class, sequence, command) returns an error
/// the dispatcher treats as "drop and keep waiting"; integrity
/// failures propagate.
fn decode_reply(
    session: &mut Option<Session>,
    datagram: &[u8],
    seq: u8,
    expected_netfn: u8,
    cmd: u8,
) -> Result<IpmbReply, IpmiError> {
    let (class, body) = strip_rmcp(datagram)?;
    if class != CLASS_IPMI {
        return Err(IpmiError::SequenceMismatch);
    }

    let ipmb_bytes = match session.as_mut() {
        Some(active) => active.decode(body)?,
        None => unpack_v15(body)?.payload,
    };

    let reply = unpack_ipmb(&ipmb_bytes)?;
    if reply.seq != seq || reply.cmd != cmd || reply.netfn != expected_netfn {
        return Err(IpmiError::SequenceMismatch);
    }
    Ok(reply)
}

/// Resolve `host:port` to the first usable socket address.
async fn resolve(host: &str, port: u16) -> Result<SocketAddr, IpmiError> {
    let mut addrs = tokio::net::lookup_host((host, port)).await?;
    addrs.next().ok_or_else(|| {
        IpmiError::Transport(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "host resolved to no addresses",
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::commands::GetBtInterfaceCapabilitiesRequest;
    use crate::session::rmcp::{BMC_ADDR, REMOTE_CONSOLE_ADDR, checksum};
    use crate::transport::MockTransport;
    use bytes::BufMut;

    /// Frame a BMC reply: IPMB response wrapped in a session-less v1.5
    /// header and an RMCP header.
    fn bmc_reply(netfn: u8, seq: u8, cmd: u8, cc: u8, data: &[u8]) -> Vec<u8> {
        let mut ipmb = Vec::new();
        ipmb.put_u8(REMOTE_CONSOLE_ADDR);
        ipmb.put_u8(netfn << 2);
        ipmb.put_u8(checksum(&ipmb[0..2]));
        ipmb.put_u8(BMC_ADDR);
        ipmb.put_u8(seq << 2);
        ipmb.put_u8(cmd);
        ipmb.put_u8(cc);
        ipmb.put_slice(data);
        ipmb.put_u8(checksum(&ipmb[3..]));
        wrap_rmcp(CLASS_IPMI, &pack_v15(AuthType::None, 0, 0, b"", &ipmb))
    }

    fn test_config() -> ClientConfig {
        ClientConfig::new("bmc.example", "admin", "secret")
            .with_attempt_timeout(Duration::from_millis(100))
            .with_command_timeout(Duration::from_millis(500))
            .with_retries(1)
    }

    #[tokio::test]
    async fn exchange_decodes_matching_reply() {
        let mut mock = MockTransport::new();
        // First client message carries seq 0.
        mock.push_frame(bmc_reply(0x07, 0, 0x36, 0x00, &[0x03, 0x40, 0x40, 0x0A, 0x01]));
        let client = Client::with_transport(test_config(), Box::new(mock));

        let cancel = CancellationToken::new();
        let req = GetBtInterfaceCapabilitiesRequest;
        let mut res = crate::commands::GetBtInterfaceCapabilitiesResponse::default();
        client.exchange(&cancel, &req, &mut res).await.unwrap();
        assert_eq!(res.outstanding_requests_supported, 3);
        assert_eq!(res.bmc_response_time_secs, 10);
    }

    #[tokio::test]
    async fn exchange_drops_mismatched_sequence_then_matches() {
        let mut mock = MockTransport::new();
        // A stray reply with the wrong sequence, then the real one.
        mock.push_frame(bmc_reply(0x07, 9, 0x36, 0x00, &[0u8; 5]));
        mock.push_frame(bmc_reply(0x07, 0, 0x36, 0x00, &[0x03, 0x40, 0x40, 0x0A, 0x01]));
        let client = Client::with_transport(test_config(), Box::new(mock));

        let cancel = CancellationToken::new();
        let mut res = crate::commands::GetBtInterfaceCapabilitiesResponse::default();
        client
            .exchange(&cancel, &GetBtInterfaceCapabilitiesRequest, &mut res)
            .await
            .unwrap();
        assert_eq!(res.input_buffer_size, 64);
    }

    #[tokio::test]
    async fn exchange_retries_after_timeout() {
        let mut mock = MockTransport::new();
        mock.push_timeout();
        // Retry carries the same IPMB sequence number.
        mock.push_frame(bmc_reply(0x07, 0, 0x36, 0x00, &[0x03, 0x40, 0x40, 0x0A, 0x01]));
        let client = Client::with_transport(test_config(), Box::new(mock));

        let cancel = CancellationToken::new();
        let mut res = crate::commands::GetBtInterfaceCapabilitiesResponse::default();
        client
            .exchange(&cancel, &GetBtInterfaceCapabilitiesRequest, &mut res)
            .await
            .unwrap();
        assert_eq!(res.output_buffer_size, 64);
    }

    #[tokio::test]
    async fn exchange_times_out_when_all_attempts_fail() {
        let client = Client::with_transport(test_config(), Box::new(MockTransport::new()));
        let cancel = CancellationToken::new();
        let mut res = crate::commands::GetBtInterfaceCapabilitiesResponse::default();
        let err = client
            .exchange(&cancel, &GetBtInterfaceCapabilitiesRequest, &mut res)
            .await
            .unwrap_err();
        assert!(matches!(err, IpmiError::Timeout(_)));
    }

    #[tokio::test]
    async fn exchange_cancellation() {
        let client = Client::with_transport(
            ClientConfig::new("bmc.example", "admin", "secret"),
            Box::new(MockTransport::new()),
        );
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut res = crate::commands::GetBtInterfaceCapabilitiesResponse::default();
        let err = client
            .exchange(&cancel, &GetBtInterfaceCapabilitiesRequest, &mut res)
            .await
            .unwrap_err();
        assert!(matches!(err, IpmiError::Cancelled));
    }

    #[tokio::test]
    async fn completion_code_prefers_command_specific_table() {
        use crate::commands::{SetPefConfigParamRequest, SetPefConfigParamResponse};

        let mut mock = MockTransport::new();
        mock.push_frame(bmc_reply(0x05, 0, 0x12, 0x81, &[]));
        let client = Client::with_transport(test_config(), Box::new(mock));

        let cancel = CancellationToken::new();
        let req = SetPefConfigParamRequest {
            selector: 0x00,
            data: vec![0x01],
        };
        let mut res = SetPefConfigParamResponse;
        let err = client.exchange(&cancel, &req, &mut res).await.unwrap_err();
        match err {
            IpmiError::CompletionCode { cc, description } => {
                assert_eq!(cc, 0x81);
                assert!(description.contains("set in progress"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn generic_completion_code_fallback() {
        let mut mock = MockTransport::new();
        mock.push_frame(bmc_reply(0x07, 0, 0x36, 0xC0, &[]));
        let client = Client::with_transport(test_config(), Box::new(mock));

        let cancel = CancellationToken::new();
        let mut res = crate::commands::GetBtInterfaceCapabilitiesResponse::default();
        let err = client
            .exchange(&cancel, &GetBtInterfaceCapabilitiesRequest, &mut res)
            .await
            .unwrap_err();
        match err {
            IpmiError::CompletionCode { cc, description } => {
                assert_eq!(cc, 0xC0);
                assert_eq!(description, "node busy");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn concurrent_exchange_is_busy() {
        let client = Client::with_transport(test_config(), Box::new(MockTransport::new()));
        let _guard = client.inner.try_lock().unwrap();

        let cancel = CancellationToken::new();
        let mut res = crate::commands::GetBtInterfaceCapabilitiesResponse::default();
        let err = client
            .exchange(&cancel, &GetBtInterfaceCapabilitiesRequest, &mut res)
            .await
            .unwrap_err();
        assert!(matches!(err, IpmiError::Busy));
    }

    #[tokio::test]
    async fn sequence_increments_across_exchanges() {
        let mut mock = MockTransport::new();
        mock.push_frame(bmc_reply(0x07, 0, 0x36, 0x00, &[0u8; 5]));
        mock.push_frame(bmc_reply(0x07, 1, 0x36, 0x00, &[0u8; 5]));
        let client = Client::with_transport(test_config(), Box::new(mock));

        let cancel = CancellationToken::new();
        let mut res = crate::commands::GetBtInterfaceCapabilitiesResponse::default();
        client
            .exchange(&cancel, &GetBtInterfaceCapabilitiesRequest, &mut res)
            .await
            .unwrap();
        client
            .exchange(&cancel, &GetBtInterfaceCapabilitiesRequest, &mut res)
            .await
            .unwrap();
    }
}
