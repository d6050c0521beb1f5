// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
//! x402 micropayment protocol: wire types, requirement selection and the
//! X-PAYMENT header carried on the replayed generation request

mod header;
mod types;

pub use header::{decode_payment_header, encode_payment_header, PAYMENT_HEADER};
pub use types::{
    ensure_within_cap, select_payment_requirements, ExactEvmAuthorization, ExactEvmPayload,
    PaymentPayload, PaymentRequiredResponse, PaymentRequirements, X402_VERSION,
};
