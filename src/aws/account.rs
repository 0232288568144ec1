//! AWS account details for a cluster
//!
//! Every cluster references a Secret holding the ARN of the IAM role the
//! operator assumes in the cluster's AWS account.

use k8s_openapi::api::core::v1::Secret;

use crate::Error;

/// Secret data key holding the role ARN
pub const ROLE_ARN_KEY: &str = "aws.awsoperator.arn";

/// Role and account the operator acts as for one cluster
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AccountDetails {
    /// 12 digit AWS account id
    pub account_id: String,
    /// IAM role ARN to assume
    pub role_arn: String,
}

impl AccountDetails {
    /// Extract the account details from a cluster's credential secret
    pub fn from_secret(cluster: &str, secret: &Secret) -> Result<Self, Error> {
        let secret_name = secret.metadata.name.as_deref().unwrap_or_default();
        let raw = secret
            .data
            .as_ref()
            .and_then(|data| data.get(ROLE_ARN_KEY))
            .ok_or_else(|| {
                Error::credentials(
                    cluster,
                    format!("secret {secret_name} has no {ROLE_ARN_KEY} key"),
                )
            })?;

        let role_arn = String::from_utf8(raw.0.clone())
            .map_err(|_| Error::credentials(cluster, format!("{ROLE_ARN_KEY} is not valid UTF-8")))?
            .trim()
            .to_string();

        Self::from_role_arn(cluster, role_arn)
    }

    /// Build the details from a role ARN, deriving the account id
    pub fn from_role_arn(cluster: &str, role_arn: impl Into<String>) -> Result<Self, Error> {
        let role_arn = role_arn.into();
        let account_id = account_id(&role_arn).ok_or_else(|| {
            Error::credentials(
                cluster,
                format!("unable to extract account id from ARN {role_arn}"),
            )
        })?;
        Ok(Self {
            account_id: account_id.to_string(),
            role_arn,
        })
    }
}

/// Account id of an ARN: `arn:partition:service:region:account-id:resource`
fn account_id(arn: &str) -> Option<&str> {
    let mut parts = arn.split(':');
    if parts.next() != Some("arn") {
        return None;
    }
    parts
        .nth(3)
        .filter(|id| !id.is_empty() && id.chars().all(|c| c.is_ascii_digit()))
}
