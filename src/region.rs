//! AWS region and partition identifiers.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// A disjoint AWS cloud. Each partition has its own default global endpoint
/// suffix and, for some services, a partition-wide endpoint independent of
/// region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Partition {
    Aws,
    AwsCn,
    AwsUsGov,
}

impl Partition {
    /// DNS suffix used to build the canonical `{service}.{region}.{suffix}` endpoint.
    pub fn dns_suffix(&self) -> &'static str {
        match self {
            Partition::Aws => "amazonaws.com",
            Partition::AwsCn => "amazonaws.com.cn",
            Partition::AwsUsGov => "amazonaws.com",
        }
    }
}

/// Closed enumeration of AWS region identifiers. Unknown identifiers are
/// preserved via `Other` so that the engine keeps working against new
/// regions AWS adds without a release of this crate.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Region {
    UsEast1,
    UsEast2,
    UsWest1,
    UsWest2,
    EuWest1,
    EuWest2,
    EuWest3,
    EuCentral1,
    EuNorth1,
    ApSoutheast1,
    ApSoutheast2,
    ApNortheast1,
    ApNortheast2,
    ApSouth1,
    SaEast1,
    CnNorth1,
    CnNorthwest1,
    UsGovEast1,
    UsGovWest1,
    /// Any region identifier not enumerated above, kept verbatim.
    Other(String),
}

impl Region {
    pub fn as_str(&self) -> &str {
        match self {
            Region::UsEast1 => "us-east-1",
            Region::UsEast2 => "us-east-2",
            Region::UsWest1 => "us-west-1",
            Region::UsWest2 => "us-west-2",
            Region::EuWest1 => "eu-west-1",
            Region::EuWest2 => "eu-west-2",
            Region::EuWest3 => "eu-west-3",
            Region::EuCentral1 => "eu-central-1",
            Region::EuNorth1 => "eu-north-1",
            Region::ApSoutheast1 => "ap-southeast-1",
            Region::ApSoutheast2 => "ap-southeast-2",
            Region::ApNortheast1 => "ap-northeast-1",
            Region::ApNortheast2 => "ap-northeast-2",
            Region::ApSouth1 => "ap-south-1",
            Region::SaEast1 => "sa-east-1",
            Region::CnNorth1 => "cn-north-1",
            Region::CnNorthwest1 => "cn-northwest-1",
            Region::UsGovEast1 => "us-gov-east-1",
            Region::UsGovWest1 => "us-gov-west-1",
            Region::Other(s) => s,
        }
    }

    pub fn partition(&self) -> Partition {
        match self.as_str() {
            s if s.starts_with("cn-") => Partition::AwsCn,
            s if s.starts_with("us-gov-") => Partition::AwsUsGov,
            _ => Partition::Aws,
        }
    }

    /// Default canonical hostname for `service` in this region, not
    /// accounting for any `serviceEndpoints`/`partitionEndpoint` override.
    /// `iam` and `s3`/`us-east-1` keep their historical single-region-less
    /// endpoints; every other service follows `{service}.{region}.{suffix}`.
    pub fn default_hostname(&self, service: &str) -> String {
        let suffix = self.partition().dns_suffix();
        match service {
            "iam" => format!("iam.{suffix}"),
            "s3" if matches!(self, Region::UsEast1) => "s3.amazonaws.com".to_string(),
            _ => format!("{service}.{}.{suffix}", self.as_str()),
        }
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Error)]
#[error("invalid region: {0}")]
pub struct InvalidRegion(pub String);

impl FromStr for Region {
    type Err = InvalidRegion;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "us-east-1" => Region::UsEast1,
            "us-east-2" => Region::UsEast2,
            "us-west-1" => Region::UsWest1,
            "us-west-2" => Region::UsWest2,
            "eu-west-1" => Region::EuWest1,
            "eu-west-2" => Region::EuWest2,
            "eu-west-3" => Region::EuWest3,
            "eu-central-1" => Region::EuCentral1,
            "eu-north-1" => Region::EuNorth1,
            "ap-southeast-1" => Region::ApSoutheast1,
            "ap-southeast-2" => Region::ApSoutheast2,
            "ap-northeast-1" => Region::ApNortheast1,
            "ap-northeast-2" => Region::ApNortheast2,
            "ap-south-1" => Region::ApSouth1,
            "sa-east-1" => Region::SaEast1,
            "cn-north-1" => Region::CnNorth1,
            "cn-northwest-1" => Region::CnNorthwest1,
            "us-gov-east-1" => Region::UsGovEast1,
            "us-gov-west-1" => Region::UsGovWest1,
            other if !other.is_empty() => Region::Other(other.to_string()),
            _ => return Err(InvalidRegion(s.to_string())),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn s3_us_east_1_has_no_region_segment() {
        assert_eq!(Region::UsEast1.default_hostname("s3"), "s3.amazonaws.com");
    }

    #[test]
    fn s3_other_region_includes_segment() {
        assert_eq!(
            Region::UsWest2.default_hostname("s3"),
            "s3.us-west-2.amazonaws.com"
        );
    }

    #[test]
    fn iam_has_no_region_segment() {
        assert_eq!(Region::UsWest2.default_hostname("iam"), "iam.amazonaws.com");
    }

    #[test]
    fn generic_service_includes_region() {
        assert_eq!(
            Region::EuWest1.default_hostname("dynamodb"),
            "dynamodb.eu-west-1.amazonaws.com"
        );
    }

    #[test]
    fn china_partition_uses_cn_suffix() {
        assert_eq!(
            Region::CnNorth1.default_hostname("dynamodb"),
            "dynamodb.cn-north-1.amazonaws.com.cn"
        );
    }

    #[test]
    fn unknown_region_round_trips() {
        let r: Region = "me-south-1".parse().unwrap();
        assert_eq!(r.as_str(), "me-south-1");
        assert_eq!(r.partition(), Partition::Aws);
    }

    #[test]
    fn empty_region_is_invalid() {
        assert!("".parse::<Region>().is_err());
    }
}
