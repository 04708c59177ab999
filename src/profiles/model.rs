use serde::Serialize;

/// A user's record: identity, shareable code and current pairing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    pub user_id: String,
    pub display_name: String,
    pub contact_handle: Option<String>,
    pub exchange_code: String,
    pub pairing_id: Option<String>,
    pub partner_user_id: Option<String>,
    pub partner_name: Option<String>,
    #[sqlx(rename = "online")]
    pub presence: bool,
    pub created_at: i64,
}

impl Profile {
    pub fn is_paired(&self) -> bool {
        self.pairing_id.is_some()
    }

    /// The profile as it should be seen when its pairing is not backed by the partner.
    pub(crate) fn unpaired(mut self) -> Self {
        self.pairing_id = None;
        self.partner_user_id = None;
        self.partner_name = None;
        self
    }
}

/// The conversation scope a profile currently belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pairing {
    pub pairing_id: String,
    pub partner_user_id: String,
    pub partner_name: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PairingStatus {
    Unpaired,
    Paired(Pairing),
    /// Points at a partner who does not point back. Treated as unpaired.
    Broken,
}

impl PairingStatus {
    /// Judges `profile`'s pairing against the record of the partner it names.
    pub fn of(profile: &Profile, partner: Option<&Profile>) -> PairingStatus {
        let (Some(pairing_id), Some(partner_user_id)) =
            (&profile.pairing_id, &profile.partner_user_id)
        else {
            return PairingStatus::Unpaired;
        };

        let Some(partner) = partner.filter(|p| &p.user_id == partner_user_id) else {
            return PairingStatus::Broken;
        };

        if partner.partner_user_id.as_deref() != Some(profile.user_id.as_str())
            || partner.pairing_id.as_deref() != Some(pairing_id.as_str())
        {
            return PairingStatus::Broken;
        }

        PairingStatus::Paired(Pairing {
            pairing_id: pairing_id.clone(),
            partner_user_id: partner_user_id.clone(),
            partner_name: partner.display_name.clone(),
        })
    }

    pub fn pairing(self) -> Option<Pairing> {
        match self {
            PairingStatus::Paired(pairing) => Some(pairing),
            _ => None,
        }
    }
}

/// Result of a successful `connect`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PairingResult {
    #[serde(flatten)]
    pub pairing: Pairing,
    /// False when the caller was already paired with this partner.
    pub newly_paired: bool,
}
