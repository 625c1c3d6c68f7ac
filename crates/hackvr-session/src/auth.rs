//! Authentication state machine and Ed25519 challenge/response.
//!
//! The server drives the cycle `Idle → AwaitSetUser → AwaitAuthenticate →
//! Idle`. Nonces are 16 random bytes from a CSPRNG, single-use, and expire
//! after 60 seconds; a short anti-reuse window catches a nonce being played
//! twice. The signature covers the UTF-8 bytes of
//! `hackvr-auth-v1:<user>:<nonce>` with the nonce rendered as lowercase hex
//! regardless of how it appeared on the wire.
//!
//! Rejections use a uniform reason so a caller cannot learn whether the
//! username or the signature was at fault.

use std::collections::VecDeque;
use std::time::Duration;

use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::RngCore;

use hackvr_protocol::{types, UserId};

/// Domain-separation prefix of the signing payload.
pub const AUTH_CONTEXT: &str = "hackvr-auth-v1";

/// Nonce lifetime.
pub const NONCE_TTL: Duration = Duration::from_secs(60);

/// How long a consumed nonce stays in the anti-reuse window.
const REUSE_WINDOW: Duration = Duration::from_secs(120);

/// Uniform rejection reason; deliberately silent about the cause.
pub const REJECTED: &str = "rejected";

/// The bytes a viewer signs: `hackvr-auth-v1:<user>:<lowercase-hex-nonce>`.
pub fn signing_payload(user: &UserId, nonce: &[u8; 16]) -> Vec<u8> {
    format!("{AUTH_CONTEXT}:{user}:{}", types::format_bytes(nonce)).into_bytes()
}

/// Viewer-side: sign a challenge.
pub fn sign_challenge(key: &SigningKey, user: &UserId, nonce: &[u8; 16]) -> [u8; 64] {
    key.sign(&signing_payload(user, nonce)).to_bytes()
}

/// What the server should send after feeding a C→S auth command in.
#[derive(Debug, Clone, PartialEq)]
pub enum AuthEvent {
    /// Send `accept-user $anonymous`; no challenge for the anonymous user.
    AcceptAnonymous,
    /// Send `request-authentication <user> <nonce>`.
    Challenge { user: UserId, nonce: [u8; 16] },
    /// Send `accept-user <user>`; the effective userid changed.
    Accepted(UserId),
    /// Send `reject-user <user> rejected`; the effective userid is back to
    /// `$anonymous`.
    Rejected(UserId),
}

/// A command arriving in a phase where it is not valid. Dropped silently
/// post-establishment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutOfOrder;

#[derive(Debug, Clone, PartialEq)]
enum Phase {
    Idle,
    AwaitSetUser,
    AwaitAuthenticate {
        user: UserId,
        nonce: [u8; 16],
        issued_at: Duration,
    },
}

/// Server-side authentication automaton for one connection.
///
/// Time is a caller-supplied monotonic `Duration` so the nonce lifecycle is
/// testable without sleeping.
#[derive(Debug)]
pub struct AuthMachine {
    phase: Phase,
    effective: UserId,
    used_nonces: VecDeque<([u8; 16], Duration)>,
}

impl AuthMachine {
    pub fn new() -> Self {
        Self {
            phase: Phase::Idle,
            effective: UserId::anonymous(),
            used_nonces: VecDeque::new(),
        }
    }

    /// The connection's current effective userid.
    pub fn effective_user(&self) -> &UserId {
        &self.effective
    }

    /// Whether the server has an outstanding `request-user`.
    pub fn awaiting_set_user(&self) -> bool {
        matches!(self.phase, Phase::AwaitSetUser)
    }

    /// Server sent `request-user`. Restarting the cycle invalidates any
    /// outstanding nonce.
    pub fn request_user(&mut self) {
        self.phase = Phase::AwaitSetUser;
    }

    /// Viewer sent `set-user`. `$anonymous` is always accepted without a
    /// challenge; any other user receives a fresh nonce.
    pub fn on_set_user(&mut self, user: UserId, now: Duration) -> Result<AuthEvent, OutOfOrder> {
        if !matches!(self.phase, Phase::AwaitSetUser) {
            return Err(OutOfOrder);
        }
        if user.is_anonymous() {
            self.effective = UserId::anonymous();
            self.phase = Phase::Idle;
            return Ok(AuthEvent::AcceptAnonymous);
        }
        let mut nonce = [0u8; 16];
        rand::rng().fill_bytes(&mut nonce);
        self.phase = Phase::AwaitAuthenticate {
            user: user.clone(),
            nonce,
            issued_at: now,
        };
        Ok(AuthEvent::Challenge { user, nonce })
    }

    /// Viewer sent `authenticate`. The nonce is consumed whatever the
    /// outcome; a rejection returns the effective userid to `$anonymous`.
    pub fn on_authenticate(
        &mut self,
        user: &UserId,
        signature: &[u8; 64],
        lookup: impl FnOnce(&UserId) -> Option<VerifyingKey>,
        now: Duration,
    ) -> Result<AuthEvent, OutOfOrder> {
        let Phase::AwaitAuthenticate {
            user: expected,
            nonce,
            issued_at,
        } = std::mem::replace(&mut self.phase, Phase::Idle)
        else {
            return Err(OutOfOrder);
        };

        self.prune_used(now);
        let reused = self.used_nonces.iter().any(|(used, _)| *used == nonce);
        self.used_nonces.push_back((nonce, now));

        let fresh = !reused && now.saturating_sub(issued_at) < NONCE_TTL;
        let verified = fresh
            && *user == expected
            && lookup(user).is_some_and(|key| {
                key.verify(&signing_payload(user, &nonce), &Signature::from_bytes(signature))
                    .is_ok()
            });

        if verified {
            self.effective = user.clone();
            Ok(AuthEvent::Accepted(user.clone()))
        } else {
            // One debug line for the operator; the wire reason stays uniform.
            log::debug!("rejecting authentication for {user}");
            self.effective = UserId::anonymous();
            Ok(AuthEvent::Rejected(user.clone()))
        }
    }

    /// Server sent `accept-user`/`reject-user` out of band (e.g. resuming a
    /// session server-side). Any outstanding nonce is invalidated.
    pub fn settle(&mut self, user: UserId) {
        self.phase = Phase::Idle;
        self.effective = user;
    }

    fn prune_used(&mut self, now: Duration) {
        while let Some((_, used_at)) = self.used_nonces.front() {
            if now.saturating_sub(*used_at) > REUSE_WINDOW {
                self.used_nonces.pop_front();
            } else {
                break;
            }
        }
    }
}

impl Default for AuthMachine {
    fn default() -> Self {
        Self::new()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    fn user(raw: &str) -> UserId {
        UserId::new(raw).unwrap()
    }

    fn keypair() -> (SigningKey, VerifyingKey) {
        let mut secret = [0u8; 32];
        rand::rng().fill_bytes(&mut secret);
        let signing = SigningKey::from_bytes(&secret);
        let verifying = signing.verifying_key();
        (signing, verifying)
    }

    fn challenge(machine: &mut AuthMachine, name: &str, now: Duration) -> [u8; 16] {
        machine.request_user();
        match machine.on_set_user(user(name), now).unwrap() {
            AuthEvent::Challenge { nonce, .. } => nonce,
            other => panic!("expected challenge, got {other:?}"),
        }
    }

    #[test]
    fn payload_uses_lowercase_hex() {
        let nonce = [0xAB; 16];
        let payload = signing_payload(&user("alice"), &nonce);
        assert_eq!(
            payload,
            format!("hackvr-auth-v1:alice:{}", "ab".repeat(16)).into_bytes()
        );
    }

    #[test]
    fn anonymous_is_accepted_without_challenge() {
        let mut machine = AuthMachine::new();
        machine.request_user();
        let event = machine.on_set_user(user("$anonymous"), secs(0)).unwrap();
        assert_eq!(event, AuthEvent::AcceptAnonymous);
        assert!(machine.effective_user().is_anonymous());
    }

    #[test]
    fn set_user_before_request_is_out_of_order() {
        let mut machine = AuthMachine::new();
        assert_eq!(machine.on_set_user(user("alice"), secs(0)), Err(OutOfOrder));
    }

    #[test]
    fn successful_round() {
        let (signing, verifying) = keypair();
        let mut machine = AuthMachine::new();
        let nonce = challenge(&mut machine, "alice", secs(0));
        let signature = sign_challenge(&signing, &user("alice"), &nonce);
        let event = machine
            .on_authenticate(&user("alice"), &signature, |_| Some(verifying), secs(1))
            .unwrap();
        assert_eq!(event, AuthEvent::Accepted(user("alice")));
        assert_eq!(machine.effective_user(), &user("alice"));
    }

    #[test]
    fn bad_signature_is_rejected_uniformly() {
        let (signing, verifying) = keypair();
        let mut machine = AuthMachine::new();
        let nonce = challenge(&mut machine, "alice", secs(0));
        let mut signature = sign_challenge(&signing, &user("alice"), &nonce);
        signature[0] ^= 1;
        let event = machine
            .on_authenticate(&user("alice"), &signature, |_| Some(verifying), secs(1))
            .unwrap();
        assert_eq!(event, AuthEvent::Rejected(user("alice")));
        assert!(machine.effective_user().is_anonymous());
    }

    #[test]
    fn unknown_user_rejected_like_bad_signature() {
        let (signing, _) = keypair();
        let mut machine = AuthMachine::new();
        let nonce = challenge(&mut machine, "mallory", secs(0));
        let signature = sign_challenge(&signing, &user("mallory"), &nonce);
        let event = machine
            .on_authenticate(&user("mallory"), &signature, |_| None, secs(1))
            .unwrap();
        assert_eq!(event, AuthEvent::Rejected(user("mallory")));
    }

    #[test]
    fn wrong_user_in_authenticate_is_rejected() {
        let (signing, verifying) = keypair();
        let mut machine = AuthMachine::new();
        let nonce = challenge(&mut machine, "alice", secs(0));
        let signature = sign_challenge(&signing, &user("bob"), &nonce);
        let event = machine
            .on_authenticate(&user("bob"), &signature, |_| Some(verifying), secs(1))
            .unwrap();
        assert_eq!(event, AuthEvent::Rejected(user("bob")));
    }

    #[test]
    fn expired_nonce_is_rejected() {
        let (signing, verifying) = keypair();
        let mut machine = AuthMachine::new();
        let nonce = challenge(&mut machine, "alice", secs(0));
        let signature = sign_challenge(&signing, &user("alice"), &nonce);
        let event = machine
            .on_authenticate(&user("alice"), &signature, |_| Some(verifying), secs(61))
            .unwrap();
        assert_eq!(event, AuthEvent::Rejected(user("alice")));
    }

    #[test]
    fn nonce_is_single_use() {
        let (signing, verifying) = keypair();
        let mut machine = AuthMachine::new();
        let nonce = challenge(&mut machine, "alice", secs(0));
        let signature = sign_challenge(&signing, &user("alice"), &nonce);
        machine
            .on_authenticate(&user("alice"), &signature, |_| Some(verifying), secs(1))
            .unwrap();

        // A second authenticate without a new challenge is out of order.
        assert_eq!(
            machine.on_authenticate(&user("alice"), &signature, |_| Some(verifying), secs(2)),
            Err(OutOfOrder)
        );
    }

    #[test]
    fn replayed_nonce_hits_reuse_window() {
        let (signing, verifying) = keypair();
        let mut machine = AuthMachine::new();
        let nonce = challenge(&mut machine, "alice", secs(0));
        let signature = sign_challenge(&signing, &user("alice"), &nonce);
        machine
            .on_authenticate(&user("alice"), &signature, |_| Some(verifying), secs(1))
            .unwrap();

        // Force the same nonce back into a new challenge phase to simulate a
        // replay; the reuse window must reject it.
        machine.phase = Phase::AwaitAuthenticate {
            user: user("alice"),
            nonce,
            issued_at: secs(2),
        };
        let event = machine
            .on_authenticate(&user("alice"), &signature, |_| Some(verifying), secs(3))
            .unwrap();
        assert_eq!(event, AuthEvent::Rejected(user("alice")));
    }

    #[test]
    fn new_request_user_invalidates_pending_nonce() {
        let (signing, verifying) = keypair();
        let mut machine = AuthMachine::new();
        let nonce = challenge(&mut machine, "alice", secs(0));
        machine.request_user();
        let signature = sign_challenge(&signing, &user("alice"), &nonce);
        assert_eq!(
            machine.on_authenticate(&user("alice"), &signature, |_| Some(verifying), secs(1)),
            Err(OutOfOrder)
        );
    }

    #[test]
    fn fresh_nonces_differ() {
        let mut machine = AuthMachine::new();
        let a = challenge(&mut machine, "alice", secs(0));
        let b = challenge(&mut machine, "alice", secs(1));
        assert_ne!(a, b, "nonces must come from a CSPRNG, not repeat");
    }
}
