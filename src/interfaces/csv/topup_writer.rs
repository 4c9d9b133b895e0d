use crate::domain::topup::Topup;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

#[derive(Debug, Serialize)]
struct TopupRow<'a> {
    topup_id: &'a str,
    user_id: u64,
    status: &'static str,
    receive_lkm: u64,
    gateway: &'a str,
    region: &'static str,
    pay_currency: &'a str,
    total_pay_amount: String,
    total_rub: String,
    risk_action: String,
    channel: &'static str,
    created_at: String,
    credited_at: String,
}

impl<'a> From<&'a Topup> for TopupRow<'a> {
    fn from(topup: &'a Topup) -> Self {
        Self {
            topup_id: &topup.topup_id,
            user_id: topup.user_id,
            status: topup.status.as_str(),
            receive_lkm: topup.receive_lkm.value(),
            gateway: &topup.pricing.gateway_code,
            region: topup.pricing.region.as_str(),
            pay_currency: &topup.pricing.pay_currency,
            total_pay_amount: topup.pricing.total_pay_amount.to_string(),
            total_rub: topup.pricing.total_rub.to_string(),
            risk_action: topup.risk.action.to_string(),
            channel: topup.channel.as_str(),
            created_at: topup.created_at.to_rfc3339(),
            credited_at: topup
                .credited_at
                .map(|at| at.to_rfc3339())
                .unwrap_or_default(),
        }
    }
}

/// Writes a flat CSV report of top-ups, one row each.
pub struct TopupWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> TopupWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_topups<'a>(&mut self, topups: impl IntoIterator<Item = &'a Topup>) -> Result<()> {
        for topup in topups {
            self.writer.serialize(TopupRow::from(topup))?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
