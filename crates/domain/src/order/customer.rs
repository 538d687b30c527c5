//! Customer, address and payment method captured at checkout.

use serde::{Deserialize, Serialize};

use crate::error::ValidationError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Customer {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: String,
}

impl Customer {
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name.trim(), self.last_name.trim())
    }

    fn validate(&self) -> Result<(), ValidationError> {
        require("customer.firstName", &self.first_name)?;
        require("customer.lastName", &self.last_name)?;
        require("customer.email", &self.email)?;
        require("customer.phone", &self.phone)?;

        let email = self.email.trim();
        match email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
            _ => Err(ValidationError::invalid(
                "customer.email",
                "is not a valid email address",
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Address {
    pub full_name: String,
    pub line1: String,
    #[serde(default)]
    pub line2: Option<String>,
    pub city: String,
    #[serde(default)]
    pub district: Option<String>,
    pub postal_code: String,
    pub country: String,
}

impl Address {
    fn validate(&self, prefix: &str) -> Result<(), ValidationError> {
        require(&format!("{prefix}.fullName"), &self.full_name)?;
        require(&format!("{prefix}.line1"), &self.line1)?;
        require(&format!("{prefix}.city"), &self.city)?;
        require(&format!("{prefix}.postalCode"), &self.postal_code)?;
        require(&format!("{prefix}.country"), &self.country)
    }

    /// Single-line rendering used in gateway forms.
    pub fn one_line(&self) -> String {
        let mut parts = vec![self.line1.trim()];
        if let Some(line2) = self.line2.as_deref().filter(|l| !l.trim().is_empty()) {
            parts.push(line2.trim());
        }
        if let Some(district) = self.district.as_deref().filter(|d| !d.trim().is_empty()) {
            parts.push(district.trim());
        }
        parts.push(self.city.trim());
        parts.push(self.postal_code.trim());
        parts.push(self.country.trim());
        parts.join(", ")
    }
}

/// How the customer intends to pay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    /// Hosted card payment through the external gateway.
    Card,
    BankTransfer,
    CashOnDelivery,
}

impl PaymentMethod {
    /// Returns true if the order is settled through the payment gateway.
    pub fn uses_gateway(&self) -> bool {
        matches!(self, PaymentMethod::Card)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Card => "card",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::CashOnDelivery => "cash_on_delivery",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "card" | "credit_card" => Some(PaymentMethod::Card),
            "bank_transfer" => Some(PaymentMethod::BankTransfer),
            "cash_on_delivery" => Some(PaymentMethod::CashOnDelivery),
            _ => None,
        }
    }
}

/// Everything besides the cart that checkout needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutDetails {
    pub customer: Customer,
    pub billing_address: Address,
    pub shipping_address: Address,
    pub payment_method: PaymentMethod,
}

impl CheckoutDetails {
    /// Presence validation for customer and both addresses.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.customer.validate()?;
        self.billing_address.validate("billingAddress")?;
        self.shipping_address.validate("shippingAddress")
    }
}

fn require(field: &str, value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        Err(ValidationError::missing(field))
    } else {
        Ok(())
    }
}
