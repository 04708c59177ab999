use sqlx::SqliteConnection;

use super::model::{PairingStatus, Profile};

const PROFILE_COLUMNS: &str = "user_id,display_name,contact_handle,exchange_code,pairing_id,partner_user_id,partner_name,online,created_at";

pub(crate) async fn fetch(conn: &mut SqliteConnection, user_id: &str) -> sqlx::Result<Option<Profile>> {
    sqlx::query_as(&format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE user_id=?"))
        .bind(user_id)
        .fetch_optional(conn)
        .await
}

pub(crate) async fn fetch_by_code(conn: &mut SqliteConnection, exchange_code: &str) -> sqlx::Result<Option<Profile>> {
    sqlx::query_as(&format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE exchange_code=?"))
        .bind(exchange_code)
        .fetch_optional(conn)
        .await
}

pub(crate) async fn code_in_use(conn: &mut SqliteConnection, exchange_code: &str) -> sqlx::Result<bool> {
    Ok(sqlx::query("SELECT 1 FROM profiles WHERE exchange_code=?")
        .bind(exchange_code)
        .fetch_optional(conn)
        .await?
        .is_some())
}

/// Inserts a new profile, online. False if a profile for `user_id` already exists.
pub(crate) async fn insert(
    conn: &mut SqliteConnection,
    user_id: &str,
    display_name: &str,
    contact_handle: Option<&str>,
    exchange_code: &str,
    created_at: i64,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        "INSERT INTO profiles (user_id,display_name,contact_handle,exchange_code,online,created_at) VALUES (?,?,?,?,1,?) ON CONFLICT(user_id) DO NOTHING",
    )
    .bind(user_id)
    .bind(display_name)
    .bind(contact_handle)
    .bind(exchange_code)
    .bind(created_at)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

pub(crate) async fn set_online(conn: &mut SqliteConnection, user_id: &str, online: bool) -> sqlx::Result<bool> {
    let result = sqlx::query("UPDATE profiles SET online=? WHERE user_id=?")
        .bind(online)
        .bind(user_id)
        .execute(conn)
        .await?;
    Ok(result.rows_affected() == 1)
}

/// Points `user_id` at `partner_user_id`, only if `user_id` is currently unpaired.
pub(crate) async fn link(
    conn: &mut SqliteConnection,
    user_id: &str,
    pairing_id: &str,
    partner_user_id: &str,
    partner_name: &str,
) -> sqlx::Result<bool> {
    let result = sqlx::query(
        "UPDATE profiles SET pairing_id=?,partner_user_id=?,partner_name=? WHERE user_id=? AND pairing_id IS NULL",
    )
    .bind(pairing_id)
    .bind(partner_user_id)
    .bind(partner_name)
    .bind(user_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Clears `user_id`'s pairing, only while it still refers to `pairing_id`.
pub(crate) async fn unlink(conn: &mut SqliteConnection, user_id: &str, pairing_id: &str) -> sqlx::Result<bool> {
    let result = sqlx::query(
        "UPDATE profiles SET pairing_id=NULL,partner_user_id=NULL,partner_name=NULL WHERE user_id=? AND pairing_id=?",
    )
    .bind(user_id)
    .bind(pairing_id)
    .execute(conn)
    .await?;
    Ok(result.rows_affected() == 1)
}

/// Profiles whose partner does not point back at them, as `(user_id, pairing_id)`.
pub(crate) async fn asymmetric(conn: &mut SqliteConnection) -> sqlx::Result<Vec<(String, String)>> {
    sqlx::query_as(
        r#"
        SELECT p.user_id, p.pairing_id
        FROM profiles p
        LEFT JOIN profiles q ON q.user_id = p.partner_user_id
        WHERE p.pairing_id IS NOT NULL
          AND (q.user_id IS NULL OR q.partner_user_id IS NOT p.user_id OR q.pairing_id IS NOT p.pairing_id)
        "#,
    )
    .fetch_all(conn)
    .await
}

/// Reads `profile`'s partner and judges the pairing.
pub(crate) async fn status_of(conn: &mut SqliteConnection, profile: &Profile) -> sqlx::Result<PairingStatus> {
    let partner = match &profile.partner_user_id {
        Some(partner_user_id) => fetch(conn, partner_user_id).await?,
        None => None,
    };
    Ok(PairingStatus::of(profile, partner.as_ref()))
}

/// The profile with a broken pairing hidden. Nothing is written.
pub(crate) async fn fetch_view(conn: &mut SqliteConnection, user_id: &str) -> sqlx::Result<Option<Profile>> {
    let Some(profile) = fetch(conn, user_id).await? else {
        return Ok(None);
    };
    Ok(Some(match status_of(conn, &profile).await? {
        PairingStatus::Broken => profile.unpaired(),
        _ => profile,
    }))
}
