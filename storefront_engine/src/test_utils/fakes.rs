//! In-process stand-ins for the external services the payment providers talk to.
use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use rust_decimal::Decimal;
use shop_common::Money;

use crate::{
    db_types::{CardDetails, PayPalDetails, PaymentDetails, PaymentMethodType},
    payments::{AddressActivity, ChainGateway, PaymentInit, PaymentProvider, PaymentProviderError, PaymentRequest, ProviderRefund},
};

/// Hands out addresses `{prefix}-addr-1`, `{prefix}-addr-2`, ... and reports whatever activity the test has set.
#[derive(Debug, Default)]
pub struct FakeChainGateway {
    prefix: String,
    issued: AtomicUsize,
    fail: AtomicBool,
    activity: Mutex<HashMap<String, AddressActivity>>,
}

impl FakeChainGateway {
    pub fn new<S: Into<String>>(prefix: S) -> Self {
        Self { prefix: prefix.into(), ..Default::default() }
    }

    pub fn fail_address_generation(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Pretends that `value` subunits have been sent to `address` with the given number of confirmations.
    pub fn set_activity(&self, address: &str, txid: &str, value: u64, confirmations: u32) {
        let activity = AddressActivity { txid: Some(txid.to_string()), value, confirmations };
        self.activity.lock().unwrap().insert(address.to_string(), activity);
    }

    pub fn addresses_issued(&self) -> usize {
        self.issued.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChainGateway for FakeChainGateway {
    async fn new_address(&self, _label: &str) -> Result<String, PaymentProviderError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PaymentProviderError::AddressGeneration("wallet is offline".into()));
        }
        let n = self.issued.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("{}-addr-{n}", self.prefix))
    }

    async fn address_activity(&self, address: &str) -> Result<Option<AddressActivity>, PaymentProviderError> {
        Ok(self.activity.lock().unwrap().get(address).cloned())
    }
}

/// A card or PayPal provider that accepts any token starting with `ok` and declines everything else. Refunds always
/// succeed and are remembered.
#[derive(Debug)]
pub struct FakeSyncProvider {
    method: PaymentMethodType,
    refunds: Mutex<Vec<(String, Money)>>,
    payments: AtomicUsize,
}

impl FakeSyncProvider {
    pub fn card() -> Self {
        Self::new(PaymentMethodType::Card)
    }

    pub fn paypal() -> Self {
        Self::new(PaymentMethodType::Paypal)
    }

    fn new(method: PaymentMethodType) -> Self {
        Self { method, refunds: Mutex::new(vec![]), payments: AtomicUsize::new(0) }
    }

    /// Every refund issued so far, as (payment reference, amount).
    pub fn refunds(&self) -> Vec<(String, Money)> {
        self.refunds.lock().unwrap().clone()
    }

    pub fn payments_taken(&self) -> usize {
        self.payments.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentProvider for FakeSyncProvider {
    fn method(&self) -> PaymentMethodType {
        self.method
    }

    async fn create_payment(&self, request: &PaymentRequest) -> Result<PaymentInit, PaymentProviderError> {
        let token = request
            .provider_token
            .clone()
            .ok_or_else(|| PaymentProviderError::InvalidPayload("A payment token is required".into()))?;
        if !token.starts_with("ok") {
            return Err(PaymentProviderError::Declined("Your card was declined".into()));
        }
        self.payments.fetch_add(1, Ordering::SeqCst);
        let details = match self.method {
            PaymentMethodType::Paypal => PaymentDetails::Paypal(PayPalDetails {
                paypal_order_id: token.clone(),
                capture_id: Some(format!("CAP-{token}")),
                payer_email: None,
            }),
            _ => PaymentDetails::Card(CardDetails {
                payment_intent_id: token,
                charge_id: None,
                card_brand: Some("visa".into()),
                last4: Some("4242".into()),
            }),
        };
        Ok(PaymentInit { details, settled: true })
    }

    fn required_confirmations(&self) -> u32 {
        0
    }

    fn tolerance(&self) -> Decimal {
        Decimal::ZERO
    }

    async fn refund(
        &self,
        details: &PaymentDetails,
        amount: Money,
        _currency: &str,
    ) -> Result<ProviderRefund, PaymentProviderError> {
        let mut refunds = self.refunds.lock().unwrap();
        refunds.push((details.reference().to_string(), amount));
        Ok(ProviderRefund { status: "succeeded".into(), refund_id: Some(format!("re_{}", refunds.len())) })
    }
}
