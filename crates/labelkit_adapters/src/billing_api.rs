use async_trait::async_trait;
use labelkit_core::entities::{PurchaseReceipt, PurchaseRequest, TokenAccount};
use labelkit_core::ports::BillingApi;
use labelkit_core::Error;
use reqwest::Client;
use tracing::instrument;

use crate::network::{endpoint, read_json, transport_error};

const BALANCE_PATH: &str = "/api/tokens/balance";
const PURCHASE_PATH: &str = "/api/tokens/purchase";

/// Token ledger endpoints of the LabelKit API
pub struct HttpBillingApi {
    client: Client,
    base_url: String,
}

impl HttpBillingApi {
    pub fn new(client: Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
        }
    }
}

#[async_trait]
impl BillingApi for HttpBillingApi {
    #[instrument(skip_all)]
    async fn balance(&self, access_token: &str) -> Result<TokenAccount, Error> {
        let response = self
            .client
            .get(endpoint(&self.base_url, BALANCE_PATH))
            .bearer_auth(access_token)
            .send()
            .await
            .map_err(transport_error)?;

        read_json(response, "Failed to fetch token balance").await
    }

    #[instrument(skip(self, access_token, request), fields(amount_ugx = request.amount_ugx, provider = %request.provider))]
    async fn purchase(
        &self,
        access_token: &str,
        request: &PurchaseRequest,
    ) -> Result<PurchaseReceipt, Error> {
        let response = self
            .client
            .post(endpoint(&self.base_url, PURCHASE_PATH))
            .bearer_auth(access_token)
            .json(request)
            .send()
            .await
            .map_err(transport_error)?;

        read_json(response, "Purchase failed").await
    }
}
