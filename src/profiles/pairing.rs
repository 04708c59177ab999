use sqlx::{SqliteConnection, SqlitePool};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::{
    db,
    error::{ChatError, ChatResult, is_unique_violation},
    hub::{Event, Hub, Subscription},
};

use super::{
    code::{generate_exchange_code, new_pairing_id, normalize_exchange_code},
    model::{Pairing, PairingResult, PairingStatus, Profile},
    store,
};

/// What the identity provider tells us about a signed-in user.
#[derive(Debug, Clone, Default)]
pub struct Identity {
    pub user_id: String,
    pub display_name: Option<String>,
    pub contact_handle: Option<String>,
}

impl Identity {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self { user_id: user_id.into(), ..Default::default() }
    }

    fn name_or_fallback(&self) -> String {
        if let Some(name) = self.display_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
            return name.to_owned();
        }
        self.contact_handle
            .as_deref()
            .and_then(|handle| handle.split('@').next())
            .map(str::trim)
            .filter(|local| !local.is_empty())
            .unwrap_or("New User")
            .to_owned()
    }
}

/// Fetches the caller's profile, creating it with a fresh exchange code on first sight.
/// Either way the profile comes back marked online.
pub async fn ensure_profile(
    db_pool: &SqlitePool,
    hub: &Hub,
    identity: &Identity,
    code_attempts: u32,
) -> ChatResult<Profile> {
    let mut conn = db_pool.acquire().await?;

    if store::set_online(&mut conn, &identity.user_id, true).await? {
        hub.profile_changed(&identity.user_id);
    } else {
        create_profile(&mut conn, identity, code_attempts, || generate_exchange_code(&mut rand::rng())).await?;
        hub.profile_changed(&identity.user_id);
    }

    store::fetch_view(&mut conn, &identity.user_id)
        .await?
        .ok_or_else(|| ChatError::ProfileNotFound(identity.user_id.clone()))
}

pub(crate) async fn create_profile(
    conn: &mut SqliteConnection,
    identity: &Identity,
    attempts: u32,
    mut generate: impl FnMut() -> String,
) -> ChatResult<()> {
    let display_name = identity.name_or_fallback();
    for attempt in 1..=attempts {
        let code = generate();
        if store::code_in_use(conn, &code).await? {
            debug!(attempt, code, "exchange code collision");
            continue;
        }

        match store::insert(
            conn,
            &identity.user_id,
            &display_name,
            identity.contact_handle.as_deref(),
            &code,
            db::now_millis(),
        )
        .await
        {
            Ok(true) => {
                info!(user_id = identity.user_id, code, display_name, "profile created");
                return Ok(());
            }
            // created concurrently by another sign-in
            Ok(false) => return Ok(()),
            Err(e) if is_unique_violation(&e) => {
                debug!(attempt, code, "exchange code taken while inserting");
            }
            Err(e) => return Err(e.into()),
        }
    }

    warn!(user_id = identity.user_id, attempts, "gave up minting an exchange code");
    Err(ChatError::CodeGenerationExhausted { attempts })
}

/// Current profile of `user_id`, with a pairing the partner does not confirm hidden.
pub async fn fetch_profile(db_pool: &SqlitePool, user_id: &str) -> ChatResult<Profile> {
    let mut conn = db_pool.acquire().await?;
    store::fetch_view(&mut conn, user_id)
        .await?
        .ok_or_else(|| ChatError::ProfileNotFound(user_id.to_owned()))
}

/// The symmetric pairing `user_id` is part of, if any.
pub async fn active_pairing(db_pool: &SqlitePool, user_id: &str) -> ChatResult<Option<Pairing>> {
    let mut conn = db_pool.acquire().await?;
    let Some(profile) = store::fetch(&mut conn, user_id).await? else {
        return Ok(None);
    };
    Ok(store::status_of(&mut conn, &profile).await?.pairing())
}

/// Like [`active_pairing`] but insists the caller is in `pairing_id`.
pub async fn require_pairing(db_pool: &SqlitePool, user_id: &str, pairing_id: &str) -> ChatResult<Pairing> {
    if pairing_id.is_empty() {
        return Err(ChatError::NotPaired);
    }
    match active_pairing(db_pool, user_id).await? {
        Some(pairing) if pairing.pairing_id == pairing_id => Ok(pairing),
        _ => Err(ChatError::NotPaired),
    }
}

/// Pairs `requester_id` with the owner of `partner_code`.
///
/// Both profiles are linked in one transaction. Asymmetric leftovers on either side
/// are cleared first. Reconnecting to the current partner succeeds without writing.
pub async fn connect(
    db_pool: &SqlitePool,
    hub: &Hub,
    requester_id: &str,
    partner_code: &str,
) -> ChatResult<PairingResult> {
    let code = normalize_exchange_code(partner_code);
    if code.is_empty() {
        return Err(ChatError::PartnerNotFound);
    }

    let mut tx = db_pool.begin().await?;

    let requester = store::fetch(&mut tx, requester_id)
        .await?
        .ok_or_else(|| ChatError::ProfileNotFound(requester_id.to_owned()))?;
    let partner = store::fetch_by_code(&mut tx, &code)
        .await?
        .ok_or(ChatError::PartnerNotFound)?;

    if partner.user_id == requester.user_id {
        return Err(ChatError::SelfPairingRejected);
    }

    let mut healed = Vec::new();

    match store::status_of(&mut tx, &requester).await? {
        PairingStatus::Paired(pairing) if pairing.partner_user_id == partner.user_id => {
            debug!(requester_id, pairing_id = pairing.pairing_id, "already paired, nothing to do");
            return Ok(PairingResult { pairing, newly_paired: false });
        }
        PairingStatus::Paired(_) => return Err(ChatError::AlreadyPaired),
        PairingStatus::Broken => {
            heal(&mut tx, &requester).await?;
            healed.push(requester.user_id.clone());
        }
        PairingStatus::Unpaired => {}
    }

    match store::status_of(&mut tx, &partner).await? {
        PairingStatus::Paired(_) => return Err(ChatError::PartnerUnavailable),
        PairingStatus::Broken => {
            heal(&mut tx, &partner).await?;
            healed.push(partner.user_id.clone());
        }
        PairingStatus::Unpaired => {}
    }

    let pairing_id = new_pairing_id();
    let linked_requester = store::link(
        &mut tx,
        &requester.user_id,
        &pairing_id,
        &partner.user_id,
        &partner.display_name,
    )
    .await?;
    let linked_partner = store::link(
        &mut tx,
        &partner.user_id,
        &pairing_id,
        &requester.user_id,
        &requester.display_name,
    )
    .await?;
    if !(linked_requester && linked_partner) {
        // someone got paired under us; dropping `tx` rolls back
        return Err(ChatError::PartnerUnavailable);
    }

    tx.commit().await?;

    for user_id in healed {
        warn!(user_id, "cleared a one-sided pairing while connecting");
    }
    info!(pairing_id, requester_id, partner_id = partner.user_id, "paired");
    hub.profile_changed(&requester.user_id);
    hub.profile_changed(&partner.user_id);

    Ok(PairingResult {
        pairing: Pairing {
            pairing_id,
            partner_user_id: partner.user_id,
            partner_name: partner.display_name,
        },
        newly_paired: true,
    })
}

async fn heal(conn: &mut SqliteConnection, profile: &Profile) -> sqlx::Result<()> {
    if let Some(pairing_id) = &profile.pairing_id {
        store::unlink(conn, &profile.user_id, pairing_id).await?;
    }
    Ok(())
}

/// Ends the requester's pairing on both profiles. The message log is kept.
///
/// The partner side is best effort: if it can't be cleared it is logged, and the
/// partner reads as unpaired anyway because the requester no longer points back.
pub async fn disconnect(db_pool: &SqlitePool, hub: &Hub, requester_id: &str) -> ChatResult<()> {
    let mut conn = db_pool.acquire().await?;

    let profile = store::fetch(&mut conn, requester_id)
        .await?
        .ok_or_else(|| ChatError::ProfileNotFound(requester_id.to_owned()))?;
    let (Some(pairing_id), partner_user_id) = (profile.pairing_id, profile.partner_user_id) else {
        return Ok(());
    };

    store::unlink(&mut conn, requester_id, &pairing_id).await?;
    hub.profile_changed(requester_id);
    info!(pairing_id, requester_id, "unpaired");

    if let Some(partner_user_id) = partner_user_id {
        if let Err(e) = store::unlink(&mut conn, &partner_user_id, &pairing_id).await {
            warn!(pairing_id, partner_user_id, "could not clear partner side: {e}");
        }
        // the partner's view changed either way
        hub.profile_changed(&partner_user_id);
    }

    Ok(())
}

/// Clears every pairing whose partner does not point back. Returns the repaired users.
pub async fn reconcile_pairings(db_pool: &SqlitePool, hub: &Hub) -> ChatResult<Vec<String>> {
    let mut conn = db_pool.acquire().await?;

    let mut repaired = Vec::new();
    for (user_id, pairing_id) in store::asymmetric(&mut conn).await? {
        if store::unlink(&mut conn, &user_id, &pairing_id).await? {
            warn!(user_id, pairing_id, "reconciled one-sided pairing");
            hub.profile_changed(&user_id);
            repaired.push(user_id);
        }
    }
    Ok(repaired)
}

pub async fn set_presence(db_pool: &SqlitePool, hub: &Hub, user_id: &str, online: bool) -> ChatResult<()> {
    let mut conn = db_pool.acquire().await?;
    if store::set_online(&mut conn, user_id, online).await? {
        debug!(user_id, online, "presence");
        hub.profile_changed(user_id);
    }
    Ok(())
}

/// Counts a live connection for `user_id`; the first one marks them online.
pub(crate) async fn connection_opened(db_pool: &SqlitePool, hub: &Hub, user_id: &str) {
    if hub.connection_opened(user_id) {
        if let Err(e) = set_presence(db_pool, hub, user_id, true).await {
            warn!(user_id, "could not mark online: {e}");
        }
    }
}

/// Drops a live connection for `user_id`; the last one marks them offline.
pub(crate) async fn connection_closed(db_pool: &SqlitePool, hub: &Hub, user_id: &str) {
    if hub.connection_closed(user_id) {
        if let Err(e) = set_presence(db_pool, hub, user_id, false).await {
            warn!(user_id, "could not mark offline: {e}");
        }
    }
}

/// Calls `callback` with `user_id`'s profile now and after every change to it.
pub fn subscribe_profile(
    db_pool: SqlitePool,
    hub: &Hub,
    user_id: String,
    mut callback: impl FnMut(Profile) + Send + 'static,
) -> Subscription {
    let mut rx = hub.subscribe();
    Subscription::spawn(async move {
        let mut last: Option<Profile> = None;
        loop {
            match fetch_profile(&db_pool, &user_id).await {
                Ok(profile) if last.as_ref() != Some(&profile) => {
                    last = Some(profile.clone());
                    callback(profile);
                }
                Ok(_) | Err(ChatError::ProfileNotFound(_)) => {}
                Err(e) => warn!(user_id, "profile subscription read failed: {e}"),
            }

            loop {
                match rx.recv().await {
                    Ok(Event::Profile { user_id: changed }) if changed == user_id => break,
                    Ok(_) => {}
                    Err(RecvError::Lagged(_)) => break,
                    Err(RecvError::Closed) => return,
                }
            }
        }
    })
}
