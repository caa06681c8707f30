//! ---
//! lic_section: "04-dispatch-api"
//! lic_subsection: "module"
//! lic_type: "source"
//! lic_scope: "code"
//! lic_description: "Wire shapes for license requests and responses."
//! lic_version: "v0.1.0-alpha"
//! lic_owner: "tbd"
//! ---
use std::collections::BTreeMap;

use licensor_engine::{
    BindRequest, CreateLicense, ExpirationPolicy, IssuerIdentity, LicenseRef, ReleaseRequest,
    UpdateLicense, UpsertLicense,
};
use licensor_store::{epoch_seconds, from_epoch_seconds, LicenseRecord};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::error::ApiError;

const DEFAULT_EDITION_LANG: &str = "en";
const DEFAULT_EDITION: &str = "Full Edition";

/// License as presented to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LicenseView {
    /// Serial.
    pub id: String,
    pub key: String,
    /// Product the key activates.
    pub aud: String,
    /// Issuer id.
    pub iss: String,
    /// Expiration in epoch seconds, absent for perpetual licenses.
    pub exp: Option<i64>,
    pub number_of_seats: u32,
    pub enabled: bool,
    pub editions: BTreeMap<String, String>,
    pub metadata: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
}

impl LicenseView {
    pub fn from_record(record: &LicenseRecord, issuer: &IssuerIdentity) -> Self {
        Self {
            id: record.serial.clone(),
            key: record.key.clone(),
            aud: record.product_id.clone(),
            iss: issuer.id().to_owned(),
            exp: record.expiration.as_ref().map(epoch_seconds),
            number_of_seats: record.number_of_seats,
            enabled: record.enabled,
            editions: BTreeMap::from([(
                DEFAULT_EDITION_LANG.to_owned(),
                DEFAULT_EDITION.to_owned(),
            )]),
            metadata: None,
            entity_id: record.bound_entity_id.clone(),
        }
    }
}

/// Response of `/add_license`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoundLicenses {
    pub licenses: Vec<LicenseView>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewLicenseData {
    #[validate(length(min = 1, max = 255, message = "must be between 1 and 255 characters"))]
    pub key: String,
    #[validate(length(min = 1, max = 255, message = "must be between 1 and 255 characters"))]
    pub aud: String,
    #[validate(
        email(message = "must be a well-formed email address"),
        length(max = 255, message = "must be at most 255 characters")
    )]
    pub email: Option<String>,
    #[validate(length(max = 1024, message = "must be at most 1024 characters"))]
    pub comment: Option<String>,
}

/// Body of `/create_license`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateLicenseBody {
    #[validate(nested)]
    pub license: NewLicenseData,
    #[validate(length(min = 1, max = 255, message = "must be between 1 and 255 characters"))]
    pub serial: String,
    #[validate(range(min = 1, message = "must be greater than 0"))]
    pub expiration: i64,
    #[validate(range(min = 1, max = 10, message = "must be between 1 and 10"))]
    pub number_of_seats: u32,
    #[serde(default)]
    pub is_upgrade: bool,
    #[validate(length(min = 1, max = 255, message = "must be between 1 and 255 characters"))]
    pub upgrade_from: Option<String>,
}

impl CreateLicenseBody {
    /// Naming a predecessor with `upgradeFrom` marks the license as an upgrade.
    pub fn into_request(self) -> Result<CreateLicense, ApiError> {
        let expiration = from_epoch_seconds(self.expiration)
            .ok_or_else(|| ApiError::bad_request("expiration is out of range"))?;
        Ok(CreateLicense {
            serial: self.serial,
            key: self.license.key,
            product_id: self.license.aud,
            number_of_seats: self.number_of_seats,
            expiration: Some(expiration),
            email: self.license.email,
            comment: self.license.comment,
            is_upgrade: self.is_upgrade || self.upgrade_from.is_some(),
            upgrade_from_key: self.upgrade_from,
        })
    }
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct KeyAndProduct {
    #[validate(length(min = 1, max = 255, message = "must be between 1 and 255 characters"))]
    pub key: String,
    #[validate(length(min = 1, max = 255, message = "must be between 1 and 255 characters"))]
    pub aud: String,
}

/// Body of `/add_license`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct BindBody {
    #[validate(nested)]
    pub license: KeyAndProduct,
    #[validate(length(min = 1, max = 255, message = "must be between 1 and 255 characters"))]
    pub entity_id: String,
    #[validate(length(min = 1, max = 255, message = "must be between 1 and 255 characters"))]
    pub precondition: Option<String>,
}

impl From<BindBody> for BindRequest {
    fn from(body: BindBody) -> Self {
        Self {
            key: body.license.key,
            product_id: body.license.aud,
            entity_id: body.entity_id,
            precondition: body.precondition,
        }
    }
}

/// Cluster member; any further license view fields sent along are ignored.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct ClusterMember {
    #[validate(length(min = 1, max = 255, message = "must be between 1 and 255 characters"))]
    pub id: String,
    #[validate(length(min = 1, max = 255, message = "must be between 1 and 255 characters"))]
    pub aud: String,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct LicenseCluster {
    #[serde(default)]
    #[validate(nested)]
    pub licenses: Vec<ClusterMember>,
}

/// Body of `/remove_license`.
#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ReleaseBody {
    #[serde(default)]
    #[validate(nested)]
    pub license_cluster: LicenseCluster,
    #[validate(length(min = 1, max = 255, message = "must be between 1 and 255 characters"))]
    pub entity_id: String,
}

impl From<ReleaseBody> for ReleaseRequest {
    fn from(body: ReleaseBody) -> Self {
        Self {
            licenses: body
                .license_cluster
                .licenses
                .into_iter()
                .map(|member| LicenseRef::new(member.id, member.aud))
                .collect(),
            entity_id: body.entity_id,
        }
    }
}

/// Body of `POST /api/licenses` and `PUT /api/licenses/:key`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct UpsertBody {
    #[validate(length(min = 1, max = 255, message = "must be between 1 and 255 characters"))]
    pub key: String,
    #[validate(length(min = 1, max = 255, message = "must be between 1 and 255 characters"))]
    pub aud: String,
    pub active: Option<bool>,
    #[validate(range(min = 1, message = "must be greater than 0"))]
    pub expiration: Option<i64>,
}

impl UpsertBody {
    fn expiration_policy(&self) -> Result<ExpirationPolicy, ApiError> {
        match self.expiration {
            Some(seconds) => from_epoch_seconds(seconds)
                .map(ExpirationPolicy::At)
                .ok_or_else(|| ApiError::bad_request("expiration is out of range")),
            None => Ok(ExpirationPolicy::DefaultTerm),
        }
    }

    pub fn into_upsert(self) -> Result<UpsertLicense, ApiError> {
        let expiration = self.expiration_policy()?;
        Ok(UpsertLicense {
            key: self.key,
            product_id: self.aud,
            active: self.active.unwrap_or(true),
            expiration,
        })
    }

    pub fn into_update(self) -> Result<UpdateLicense, ApiError> {
        let expiration = self.expiration_policy()?;
        Ok(UpdateLicense {
            key: self.key,
            product_id: self.aud,
            active: self.active.unwrap_or(true),
            expiration,
        })
    }
}

/// Query of `/get_license`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct GetLicenseQuery {
    #[validate(length(min = 1, max = 255, message = "must be between 1 and 255 characters"))]
    pub key: String,
    #[validate(length(min = 1, max = 255, message = "must be between 1 and 255 characters"))]
    pub aud: String,
}

/// Query of `/erase_license`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct EraseLicenseQuery {
    #[validate(length(min = 1, max = 255, message = "must be between 1 and 255 characters"))]
    pub key: String,
}

/// Body of `/api/auth/login`.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginBody {
    #[validate(length(min = 1, message = "must not be blank"))]
    pub username: String,
    #[validate(length(min = 1, message = "must not be blank"))]
    pub password: String,
}
