use serde_json::Value;

/// Interpretation of one provider status poll.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MfaStatus {
    Success,
    AwaitingPush,
    Declined { suspicious: bool },
    Blocked,
    BadCode,
    StaleCode,
    BadRequest,
    Unrecognized,
}

impl MfaStatus {
    /// Classify a status response body.
    ///
    /// `response.result == "SUCCESS"` wins over any enum value.
    pub fn classify(body: &Value) -> Self {
        let response = body.get("response");
        let result = response
            .and_then(|r| r.get("result"))
            .and_then(Value::as_str)
            .unwrap_or_default();
        let status_enum = response
            .and_then(|r| r.get("status_enum"))
            .and_then(Value::as_i64)
            .unwrap_or(-1);
        let message_enum = body
            .get("message_enum")
            .and_then(Value::as_i64)
            .unwrap_or(-1);

        if result == "SUCCESS" {
            return MfaStatus::Success;
        }
        match status_enum {
            5 => MfaStatus::Success,
            6 => MfaStatus::Declined { suspicious: false },
            7 => MfaStatus::Declined { suspicious: true },
            11 => MfaStatus::BadCode,
            13 => MfaStatus::AwaitingPush,
            15 => MfaStatus::Blocked,
            44 => MfaStatus::StaleCode,
            _ if message_enum == 57 => MfaStatus::BadRequest,
            _ => MfaStatus::Unrecognized,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_enum_table() {
        let cases = [
            (5, MfaStatus::Success),
            (6, MfaStatus::Declined { suspicious: false }),
            (7, MfaStatus::Declined { suspicious: true }),
            (11, MfaStatus::BadCode),
            (13, MfaStatus::AwaitingPush),
            (15, MfaStatus::Blocked),
            (44, MfaStatus::StaleCode),
            (99, MfaStatus::Unrecognized),
        ];
        for (status_enum, expected) in cases {
            let body = json!({"stat": "OK", "response": {"status_enum": status_enum}});
            assert_eq!(MfaStatus::classify(&body), expected, "enum {status_enum}");
        }
    }

    #[test]
    fn result_text_means_success() {
        let body = json!({"response": {"result": "SUCCESS", "status_enum": 13}});
        assert_eq!(MfaStatus::classify(&body), MfaStatus::Success);
    }

    #[test]
    fn bad_request_uses_message_enum() {
        let body = json!({"stat": "FAIL", "message_enum": 57, "message": "Invalid request."});
        assert_eq!(MfaStatus::classify(&body), MfaStatus::BadRequest);
        assert_eq!(MfaStatus::classify(&json!({})), MfaStatus::Unrecognized);
    }
}
