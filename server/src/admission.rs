//! Admission pipeline
//!
//! Every handshake is run through an ordered list of checks before the
//! player may join:
//!
//! 1. name grammar
//! 2. per-IP throttle
//! 3. credentials (mppass or reconnect token)
//! 4. temporary ban, expiring lapsed bans on the way
//! 5. whitelist
//! 6. rank assignment
//! 7. permanent ban (banned IP or banned rank)
//! 8. capacity
//!
//! The first check that rejects ends the attempt; later checks never run.
//!
//! ## Failure policy
//!
//! A check can also fail internally, for example on a corrupt ban record.
//! Each check declares up front what that means through [`FailurePolicy`]:
//! `FailOpen` logs the error and lets the attempt continue, `FailClosed`
//! rejects with the rejection the check names. Name, credentials and
//! whitelist are declared fail-closed. Of those only credential
//! verification can currently error; the other two evaluate infallibly and
//! their policy applies only if that changes.

use crate::bans::{shorten, BanStore, TempBanStatus};
use crate::capacity::{CapacityController, CapacityDecision};
use crate::credentials::CredentialVerifier;
use crate::error::CheckError;
use crate::lists::NameList;
use crate::names::validate_name;
use crate::ranks::RankTable;
use crate::state::AdmissionState;
use crate::throttle::ConnectionThrottle;
use chrono::{DateTime, Utc};
use log::{error, info};
use shared::Rank;
use std::net::IpAddr;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Instant;

pub const LOGIN_FAILED_MESSAGE: &str = "Login failed - credentials rejected.";

/// A handshake waiting for a verdict.
#[derive(Debug, Clone)]
pub struct ConnectionAttempt {
    pub name: String,
    /// Credential token supplied by the client
    pub mppass: String,
    /// Canonical form: IPv4-mapped IPv6 addresses are stored as IPv4
    pub source: IpAddr,
    verified: bool,
}

impl ConnectionAttempt {
    pub fn new(name: impl Into<String>, mppass: impl Into<String>, source: IpAddr) -> Self {
        Self {
            name: name.into(),
            mppass: mppass.into(),
            source: source.to_canonical(),
            verified: false,
        }
    }

    /// True once the credential check matched a token or mppass.
    pub fn is_verified(&self) -> bool {
        self.verified
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectKind {
    StructuralInvalid,
    Throttled,
    CredentialRejected,
    Banned,
    WhitelistRejected,
    CapacityExceeded,
}

impl RejectKind {
    /// Whether retrying later could succeed without operator action.
    pub fn is_transient(&self) -> bool {
        matches!(self, RejectKind::Throttled | RejectKind::CapacityExceeded)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub kind: RejectKind,
    /// Message shown to the player
    pub reason: String,
    /// Hard disconnect, as opposed to an informational kick
    pub fatal: bool,
}

impl Rejection {
    pub fn fatal(kind: RejectKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
            fatal: true,
        }
    }

    pub fn kick(kind: RejectKind, reason: impl Into<String>) -> Self {
        Self {
            kind,
            reason: reason.into(),
            fatal: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdmissionResult {
    Accepted { rank: Rank, verified: bool },
    Rejected(Rejection),
}

impl AdmissionResult {
    pub fn is_accepted(&self) -> bool {
        matches!(self, AdmissionResult::Accepted { .. })
    }

    pub fn rejection(&self) -> Option<&Rejection> {
        match self {
            AdmissionResult::Rejected(rejection) => Some(rejection),
            AdmissionResult::Accepted { .. } => None,
        }
    }
}

/// What an internal error in a check resolves to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    FailOpen,
    FailClosed {
        kind: RejectKind,
        message: &'static str,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckOutcome {
    Pass,
    Reject(Rejection),
}

/// Per-attempt state threaded through the checks.
#[derive(Debug)]
pub struct AttemptContext {
    pub attempt: ConnectionAttempt,
    /// Set by the rank check
    pub rank: Option<Rank>,
    pub now: DateTime<Utc>,
    pub instant: Instant,
}

impl AttemptContext {
    pub fn new(attempt: ConnectionAttempt) -> Self {
        Self {
            attempt,
            rank: None,
            now: Utc::now(),
            instant: Instant::now(),
        }
    }
}

/// One step of the admission pipeline.
pub trait AdmissionCheck: Send + Sync {
    fn name(&self) -> &'static str;

    fn policy(&self) -> FailurePolicy;

    fn evaluate(&self, ctx: &mut AttemptContext) -> Result<CheckOutcome, CheckError>;
}

pub struct NameCheck;

impl AdmissionCheck for NameCheck {
    fn name(&self) -> &'static str {
        "name"
    }

    fn policy(&self) -> FailurePolicy {
        FailurePolicy::FailClosed {
            kind: RejectKind::StructuralInvalid,
            message: "Invalid player name",
        }
    }

    fn evaluate(&self, ctx: &mut AttemptContext) -> Result<CheckOutcome, CheckError> {
        Ok(match validate_name(&ctx.attempt.name) {
            Ok(()) => CheckOutcome::Pass,
            Err(e) => CheckOutcome::Reject(Rejection::fatal(
                RejectKind::StructuralInvalid,
                e.to_string(),
            )),
        })
    }
}

pub struct ThrottleCheck {
    throttle: Arc<dyn ConnectionThrottle>,
}

impl ThrottleCheck {
    pub fn new(throttle: Arc<dyn ConnectionThrottle>) -> Self {
        Self { throttle }
    }
}

impl AdmissionCheck for ThrottleCheck {
    fn name(&self) -> &'static str {
        "throttle"
    }

    fn policy(&self) -> FailurePolicy {
        FailurePolicy::FailOpen
    }

    fn evaluate(&self, ctx: &mut AttemptContext) -> Result<CheckOutcome, CheckError> {
        Ok(match self.throttle.check(ctx.attempt.source, ctx.instant) {
            Ok(()) => CheckOutcome::Pass,
            Err(e) => CheckOutcome::Reject(Rejection::fatal(RejectKind::Throttled, e.to_string())),
        })
    }
}

pub struct CredentialCheck {
    verifier: CredentialVerifier,
}

impl CredentialCheck {
    pub fn new(verifier: CredentialVerifier) -> Self {
        Self { verifier }
    }
}

impl AdmissionCheck for CredentialCheck {
    fn name(&self) -> &'static str {
        "credentials"
    }

    fn policy(&self) -> FailurePolicy {
        FailurePolicy::FailClosed {
            kind: RejectKind::CredentialRejected,
            message: LOGIN_FAILED_MESSAGE,
        }
    }

    fn evaluate(&self, ctx: &mut AttemptContext) -> Result<CheckOutcome, CheckError> {
        let attempt = &mut ctx.attempt;
        let verification = self
            .verifier
            .verify(&attempt.name, &attempt.mppass, attempt.source)?;
        attempt.verified = verification.is_verified();

        Ok(if verification.is_accepted() {
            CheckOutcome::Pass
        } else {
            CheckOutcome::Reject(Rejection::fatal(
                RejectKind::CredentialRejected,
                LOGIN_FAILED_MESSAGE,
            ))
        })
    }
}

pub struct TempBanCheck {
    temp_bans: Arc<BanStore>,
}

impl TempBanCheck {
    pub fn new(temp_bans: Arc<BanStore>) -> Self {
        Self { temp_bans }
    }
}

impl AdmissionCheck for TempBanCheck {
    fn name(&self) -> &'static str {
        "temp ban"
    }

    fn policy(&self) -> FailurePolicy {
        FailurePolicy::FailOpen
    }

    fn evaluate(&self, ctx: &mut AttemptContext) -> Result<CheckOutcome, CheckError> {
        match self.temp_bans.check_temp(&ctx.attempt.name, ctx.now)? {
            TempBanStatus::NotBanned | TempBanStatus::Expired => Ok(CheckOutcome::Pass),
            TempBanStatus::Active { record, remaining } => {
                let reason = if record.reason.is_empty() {
                    String::new()
                } else {
                    format!(" ({})", record.reason)
                };
                let message = format!(
                    "Banned by {} for another {}{}",
                    record.banner,
                    shorten(remaining, true),
                    reason
                );
                Ok(CheckOutcome::Reject(Rejection::kick(RejectKind::Banned, message)))
            }
        }
    }
}

pub struct WhitelistCheck {
    enabled: bool,
    whitelist: Arc<NameList>,
    message: String,
}

impl WhitelistCheck {
    pub fn new(enabled: bool, whitelist: Arc<NameList>, message: impl Into<String>) -> Self {
        Self {
            enabled,
            whitelist,
            message: message.into(),
        }
    }
}

impl AdmissionCheck for WhitelistCheck {
    fn name(&self) -> &'static str {
        "whitelist"
    }

    fn policy(&self) -> FailurePolicy {
        FailurePolicy::FailClosed {
            kind: RejectKind::WhitelistRejected,
            message: "You are not on the whitelist.",
        }
    }

    fn evaluate(&self, ctx: &mut AttemptContext) -> Result<CheckOutcome, CheckError> {
        if !self.enabled || self.whitelist.contains(&ctx.attempt.name) {
            return Ok(CheckOutcome::Pass);
        }
        Ok(CheckOutcome::Reject(Rejection::fatal(
            RejectKind::WhitelistRejected,
            self.message.clone(),
        )))
    }
}

pub struct RankCheck {
    ranks: Arc<RankTable>,
}

impl RankCheck {
    pub fn new(ranks: Arc<RankTable>) -> Self {
        Self { ranks }
    }
}

impl AdmissionCheck for RankCheck {
    fn name(&self) -> &'static str {
        "rank"
    }

    fn policy(&self) -> FailurePolicy {
        FailurePolicy::FailOpen
    }

    fn evaluate(&self, ctx: &mut AttemptContext) -> Result<CheckOutcome, CheckError> {
        ctx.rank = Some(self.ranks.rank_of(&ctx.attempt.name));
        Ok(CheckOutcome::Pass)
    }
}

pub struct PermanentBanCheck {
    banned_ips: Arc<NameList>,
    bans: Arc<BanStore>,
    default_message: String,
}

impl PermanentBanCheck {
    pub fn new(
        banned_ips: Arc<NameList>,
        bans: Arc<BanStore>,
        default_message: impl Into<String>,
    ) -> Self {
        Self {
            banned_ips,
            bans,
            default_message: message_or_default(default_message.into()),
        }
    }

    fn banned(&self, message: String) -> CheckOutcome {
        CheckOutcome::Reject(Rejection::fatal(RejectKind::Banned, message))
    }
}

fn message_or_default(message: String) -> String {
    if message.is_empty() {
        "You're banned!".to_string()
    } else {
        message
    }
}

impl AdmissionCheck for PermanentBanCheck {
    fn name(&self) -> &'static str {
        "permanent ban"
    }

    fn policy(&self) -> FailurePolicy {
        FailurePolicy::FailOpen
    }

    fn evaluate(&self, ctx: &mut AttemptContext) -> Result<CheckOutcome, CheckError> {
        if self.banned_ips.contains(&ctx.attempt.source.to_string()) {
            return Ok(self.banned(self.default_message.clone()));
        }

        let rank = ctx.rank.ok_or(CheckError::RankUnassigned(self.name()))?;
        if rank != Rank::BANNED {
            return Ok(CheckOutcome::Pass);
        }

        // The record only supplies the text; the rank alone decides the ban
        let message = match self.bans.lookup(&ctx.attempt.name) {
            Ok(Some(record)) => format!("Banned by {}: {}", record.banner, record.reason),
            Ok(None) => self.default_message.clone(),
            Err(e) => {
                error!("Unreadable ban record for {}: {}", ctx.attempt.name, e);
                self.default_message.clone()
            }
        };
        Ok(self.banned(message))
    }
}

pub struct CapacityCheck {
    controller: CapacityController,
}

impl CapacityCheck {
    pub fn new(controller: CapacityController) -> Self {
        Self { controller }
    }
}

impl AdmissionCheck for CapacityCheck {
    fn name(&self) -> &'static str {
        "capacity"
    }

    fn policy(&self) -> FailurePolicy {
        FailurePolicy::FailOpen
    }

    fn evaluate(&self, ctx: &mut AttemptContext) -> Result<CheckOutcome, CheckError> {
        let rank = ctx.rank.ok_or(CheckError::RankUnassigned(self.name()))?;
        let decision = self
            .controller
            .has_room(&ctx.attempt.name, ctx.attempt.source, rank);
        Ok(match decision.message() {
            None => CheckOutcome::Pass,
            Some(message) => {
                CheckOutcome::Reject(Rejection::fatal(RejectKind::CapacityExceeded, message))
            }
        })
    }
}

/// The ordered check list and its evaluator.
pub struct AdmissionPipeline {
    checks: Vec<Box<dyn AdmissionCheck>>,
    default_rank: Rank,
}

impl AdmissionPipeline {
    /// Builds the standard eight-step pipeline over `state`.
    pub fn new(state: &AdmissionState) -> Self {
        Self::from_checks(Self::standard_checks(state), state.config.default_rank)
    }

    /// The standard checks, in order, for callers that want to extend them.
    pub fn standard_checks(state: &AdmissionState) -> Vec<Box<dyn AdmissionCheck>> {
        let config = &state.config;
        let controller = CapacityController::new(
            state.capacity_limits(),
            Arc::clone(&state.vips),
            Arc::clone(&state.online),
            Arc::clone(&state.notifier),
        );
        vec![
            Box::new(NameCheck),
            Box::new(ThrottleCheck::new(Arc::clone(&state.throttle))),
            Box::new(CredentialCheck::new(state.verifier())),
            Box::new(TempBanCheck::new(Arc::clone(&state.temp_bans))),
            Box::new(WhitelistCheck::new(
                config.whitelisted_only,
                Arc::clone(&state.whitelist),
                config.default_whitelist_message.clone(),
            )),
            Box::new(RankCheck::new(Arc::clone(&state.ranks))),
            Box::new(PermanentBanCheck::new(
                Arc::clone(&state.banned_ips),
                Arc::clone(&state.bans),
                config.default_ban_message.clone(),
            )),
            Box::new(CapacityCheck::new(controller)),
        ]
    }

    pub fn from_checks(checks: Vec<Box<dyn AdmissionCheck>>, default_rank: Rank) -> Self {
        Self {
            checks,
            default_rank,
        }
    }

    pub fn check_names(&self) -> Vec<&'static str> {
        self.checks.iter().map(|check| check.name()).collect()
    }

    /// Runs every check in order and returns the verdict.
    pub fn admit(&self, attempt: ConnectionAttempt) -> AdmissionResult {
        let mut ctx = AttemptContext::new(attempt);

        let flow = self.checks.iter().try_for_each(|check| {
            match Self::run_check(check.as_ref(), &mut ctx) {
                CheckOutcome::Pass => ControlFlow::Continue(()),
                CheckOutcome::Reject(rejection) => ControlFlow::Break((check.name(), rejection)),
            }
        });

        match flow {
            ControlFlow::Continue(()) => {
                let rank = ctx.rank.unwrap_or(self.default_rank);
                info!(
                    "{} ({}) admitted as {}",
                    ctx.attempt.name, ctx.attempt.source, rank
                );
                AdmissionResult::Accepted {
                    rank,
                    verified: ctx.attempt.verified,
                }
            }
            ControlFlow::Break((check, rejection)) => {
                info!(
                    "{} ({}) rejected by {} check: {}",
                    ctx.attempt.name, ctx.attempt.source, check, rejection.reason
                );
                AdmissionResult::Rejected(rejection)
            }
        }
    }

    fn run_check(check: &dyn AdmissionCheck, ctx: &mut AttemptContext) -> CheckOutcome {
        match check.evaluate(ctx) {
            Ok(outcome) => outcome,
            Err(e) => match check.policy() {
                FailurePolicy::FailOpen => {
                    error!(
                        "{} check failed for {} ({}), letting through: {}",
                        check.name(),
                        ctx.attempt.name,
                        ctx.attempt.source,
                        e
                    );
                    CheckOutcome::Pass
                }
                FailurePolicy::FailClosed { kind, message } => {
                    error!(
                        "{} check failed for {} ({}), rejecting: {}",
                        check.name(),
                        ctx.attempt.name,
                        ctx.attempt.source,
                        e
                    );
                    CheckOutcome::Reject(Rejection::fatal(kind, message))
                }
            },
        }
    }
}
