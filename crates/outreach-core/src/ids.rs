use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! newtype_id {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        pub struct $name(pub String);

        impl $name {
            /// UUIDv7 — time-sortable, so enrollment/log ids correlate with
            /// creation order in queries and in logs without a separate
            /// `created_at` join.
            pub fn new() -> Self {
                Self(Uuid::now_v7().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

newtype_id!(UserId);
newtype_id!(MessagingAccountId);
newtype_id!(BusinessProfileId);
newtype_id!(CampaignId);
newtype_id!(LeadId);
newtype_id!(SequenceId);
newtype_id!(SequenceStepId);
newtype_id!(EnrollmentId);
newtype_id!(InvitationLogId);
