use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::errors::PublishError;
use crate::model::{EVENT_TYPE_ATTRIBUTE, EventData, PartitionId, SendOptions};
use crate::platform::StreamPublisher;

pub const REQUEST_EVENT_TYPE: &str = "UserRequest";
/// Partition reserved for `sell` requests.
pub const SELL_PARTITION: &str = "1";

/// A request submitted by a client. Serialised with PascalCase keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct UserRequest {
    pub user_id: Option<String>,
    pub request_id: Option<String>,
    pub request_type: Option<String>,
    pub request_parameter_list: Option<Vec<String>>,
}

impl UserRequest {
    pub fn new(
        user_id: impl Into<String>,
        request_id: impl Into<String>,
        request_type: impl Into<String>,
    ) -> Self {
        Self {
            user_id: Some(user_id.into()),
            request_id: Some(request_id.into()),
            request_type: Some(request_type.into()),
            request_parameter_list: None,
        }
    }

    pub fn with_parameters(mut self, parameters: Vec<String>) -> Self {
        self.request_parameter_list = Some(parameters);
        self
    }

    /// Returns the request type once every required field is non-blank.
    fn validate(&self) -> Result<&str, PublishError> {
        fn required(value: &Option<String>) -> Option<&str> {
            value.as_deref().filter(|v| !v.trim().is_empty())
        }
        match (
            required(&self.user_id),
            required(&self.request_id),
            required(&self.request_type),
        ) {
            (Some(_), Some(_), Some(request_type)) => Ok(request_type),
            _ => Err(PublishError::InvalidRequest(
                "UserId, RequestId and RequestType are required".into(),
            )),
        }
    }
}

/// Publishes user requests, routing `sell` requests to their own partition.
pub struct RequestPublisher {
    publisher: Arc<dyn StreamPublisher>,
    default_partition: PartitionId,
}

impl RequestPublisher {
    pub fn new(publisher: Arc<dyn StreamPublisher>, default_partition: impl Into<PartitionId>) -> Self {
        Self {
            publisher,
            default_partition: default_partition.into(),
        }
    }

    pub fn default_partition(&self) -> &PartitionId {
        &self.default_partition
    }

    fn route(&self, request_type: &str) -> PartitionId {
        if request_type.eq_ignore_ascii_case("sell") {
            PartitionId::from(SELL_PARTITION)
        } else {
            self.default_partition.clone()
        }
    }

    /// Validates, serialises and sends `request`. Returns the partition it went to.
    pub async fn process_request(&self, request: &UserRequest) -> Result<PartitionId, PublishError> {
        let request_type = request.validate()?;
        let partition = self.route(request_type);
        let body = serde_json::to_vec(request)
            .map_err(|err| PublishError::InvalidRequest(err.to_string()))?;
        let event = EventData::new(body).with_property(EVENT_TYPE_ATTRIBUTE, REQUEST_EVENT_TYPE);

        self.publisher
            .send(vec![event], &SendOptions::to_partition(partition.clone()))
            .await?;
        info!(
            event = "publish.request_sent",
            domain = "publish",
            user_id = request.user_id.as_deref().unwrap_or_default(),
            request_id = request.request_id.as_deref().unwrap_or_default(),
            request_type,
            partition = %partition
        );
        Ok(partition)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::platform::InMemoryEventHub;

    fn publisher(hub: &InMemoryEventHub, default_partition: &str) -> RequestPublisher {
        RequestPublisher::new(Arc::new(hub.clone()), default_partition)
    }

    #[test]
    fn serialises_with_pascal_case_keys() {
        let request = UserRequest::new("u1", "r1", "buy").with_parameters(vec!["AAPL".into()]);
        let json: serde_json::Value = serde_json::to_value(&request).unwrap();
        assert_eq!(json["UserId"], "u1");
        assert_eq!(json["RequestId"], "r1");
        assert_eq!(json["RequestType"], "buy");
        assert_eq!(json["RequestParameterList"][0], "AAPL");
    }

    #[tokio::test]
    async fn sell_goes_to_partition_one_and_others_to_default() {
        let hub = InMemoryEventHub::new("hub", 2);
        let publisher = publisher(&hub, "0");

        let sell = publisher
            .process_request(&UserRequest::new("u1", "r1", "SELL"))
            .await
            .unwrap();
        let buy = publisher
            .process_request(&UserRequest::new("u1", "r2", "buy"))
            .await
            .unwrap();
        // Routing is per call: a sell does not leak into the next request.
        let buy_again = publisher
            .process_request(&UserRequest::new("u1", "r3", "buy"))
            .await
            .unwrap();

        assert_eq!(sell, PartitionId::from("1"));
        assert_eq!(buy, PartitionId::from("0"));
        assert_eq!(buy_again, PartitionId::from("0"));
        assert_eq!(hub.partition_len(&"1".into()).await.unwrap(), 1);
        assert_eq!(hub.partition_len(&"0".into()).await.unwrap(), 2);
    }

    #[tokio::test]
    async fn blank_fields_are_rejected_without_sending() {
        let hub = InMemoryEventHub::new("hub", 2);
        let publisher = publisher(&hub, "0");

        for request in [
            UserRequest::new(" ", "r1", "buy"),
            UserRequest::new("u1", "", "buy"),
            UserRequest::new("u1", "r1", "\t"),
            UserRequest::default(),
        ] {
            let err = publisher.process_request(&request).await.unwrap_err();
            assert!(matches!(err, PublishError::InvalidRequest(_)));
        }
        assert_eq!(hub.partition_len(&"0".into()).await.unwrap(), 0);
        assert_eq!(hub.partition_len(&"1".into()).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_default_partition_surfaces_platform_error() {
        let hub = InMemoryEventHub::new("hub", 2);
        let publisher = publisher(&hub, "7");

        let err = publisher
            .process_request(&UserRequest::new("u1", "r1", "buy"))
            .await
            .unwrap_err();

        assert!(matches!(err, PublishError::Platform(_)));
    }
}
