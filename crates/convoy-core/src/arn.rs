//! Backend resource names.
//!
//! `arn:partition:service:region:account:resource`, where the resource
//! segment may itself contain `:` or `/` separators.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid resource name: {0}")]
pub struct ArnError(pub String);

/// A parsed resource name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arn<'a> {
    pub partition: &'a str,
    pub service: &'a str,
    pub region: &'a str,
    pub account: &'a str,
    pub resource: &'a str,
}

pub fn parse(arn: &str) -> Result<Arn<'_>, ArnError> {
    let mut parts = arn.splitn(6, ':');
    let prefix = parts.next();
    let fields = (
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
        parts.next(),
    );
    match (prefix, fields) {
        (Some("arn"), (Some(partition), Some(service), Some(region), Some(account), Some(resource)))
            if !resource.is_empty() =>
        {
            Ok(Arn {
                partition,
                service,
                region,
                account,
                resource,
            })
        }
        _ => Err(ArnError(arn.to_string())),
    }
}

/// The trailing id of the resource segment, e.g. the task id of
/// `arn:aws:ecs:us-east-1:123456789012:task/1ef2c4`.
pub fn resource_id(arn: &str) -> Result<&str, ArnError> {
    let parsed = parse(arn)?;
    let id = parsed
        .resource
        .rsplit(['/', ':'])
        .next()
        .unwrap_or(parsed.resource);
    if id.is_empty() {
        return Err(ArnError(arn.to_string()));
    }
    Ok(id)
}
