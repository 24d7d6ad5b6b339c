//! Lifecycle Reconciler — recipient events to sequence commands.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use rand::Rng;
use serde::Deserialize;

use leadclaw_core::config::LifecycleConfig;
use leadclaw_core::error::{LeadClawError, Result};
use leadclaw_core::phone;
use leadclaw_core::types::{Lead, LeadStage};
use leadclaw_dispatch::DispatchEngine;
use leadclaw_store::{LeadPatch, Store};

use crate::stages::advance_stage;

/// Which funnel the form belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum FormFlow {
    /// Informational business site.
    #[default]
    Website,
    /// Digital event invitation.
    Invitation,
}

/// A completed intake form.
#[derive(Debug, Clone, Deserialize)]
pub struct FormSubmission {
    #[serde(alias = "leadPhone")]
    pub phone: String,
    #[serde(default, alias = "nombre")]
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub flow: FormFlow,
    /// Everything else the form captured, persisted verbatim.
    #[serde(default)]
    pub fields: serde_json::Value,
}

/// A recipient reference as lifecycle endpoints accept it:
/// by lead id, phone, or (for link tracking) site slug.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct LeadRef {
    #[serde(default, alias = "leadId")]
    pub lead_id: Option<String>,
    #[serde(default, alias = "leadPhone")]
    pub phone: Option<String>,
    #[serde(default)]
    pub slug: Option<String>,
}

/// What a lifecycle event produced.
#[derive(Debug, Clone)]
pub struct LifecycleOutcome {
    /// Second delivery of an at-most-once event.
    pub already: bool,
    /// When the bound sequence will start, if one was scheduled.
    pub scheduled_at: Option<DateTime<Utc>>,
    pub lead_id: String,
    /// The lead's public site slug, when one is known.
    pub slug: Option<String>,
}

/// Applies lifecycle transitions and reconciles the scheduled sequences.
pub struct LifecycleReconciler {
    store: Arc<Store>,
    engine: Arc<DispatchEngine>,
    config: LifecycleConfig,
}

impl LifecycleReconciler {
    pub fn new(store: Arc<Store>, engine: Arc<DispatchEngine>, config: LifecycleConfig) -> Self {
        Self {
            store,
            engine,
            config,
        }
    }

    /// Register a brand-new lead. Duplicate phone is a conflict.
    pub fn register_lead(&self, raw_phone: &str, name: &str) -> Result<Lead> {
        let lead = self.store.create_lead(raw_phone, name)?;
        tracing::info!("👤 lead registered: {} ({})", lead.phone, lead.name);
        Ok(lead)
    }

    /// A lead completed the intake form.
    ///
    /// Tags the lead, persists the submission, and sends two humanized
    /// follow-up texts with pseudo-random jitter — deliberately not a
    /// tracked sequence, so nothing here needs cancelling later.
    pub fn form_submitted(&self, sub: FormSubmission) -> Result<LifecycleOutcome> {
        let id = phone::lead_id(&sub.phone)?;
        let existing_stage = self
            .store
            .get_lead(&id)?
            .map(|l| l.stage)
            .unwrap_or_default();

        let lead = self.store.upsert_lead(
            &id,
            LeadPatch {
                name: (!sub.name.is_empty()).then(|| sub.name.clone()),
                slug: sub.slug.clone(),
                stage: advance_stage(existing_stage, LeadStage::FormSubmitted),
                add_tags: vec!["FormOK".into()],
                form_data: Some(sub.fields.clone()),
                ..Default::default()
            },
        )?;

        let first_name = sub
            .name
            .split_whitespace()
            .next()
            .unwrap_or("")
            .to_string();
        let greeting = if first_name.is_empty() {
            String::new()
        } else {
            format!("{first_name}, ")
        };
        let (msg1, msg2) = match sub.flow {
            FormFlow::Invitation => (
                format!(
                    "{greeting}ya recibí los datos de tu evento. Estoy generando tu \
                     invitación digital para que la compartas hoy mismo."
                ),
                "En cuanto esté lista te enviaré el enlace editable y una versión lista \
                 para compartir por WhatsApp con tus invitados."
                    .to_string(),
            ),
            FormFlow::Website => (
                format!(
                    "{greeting}ya recibí tu formulario. Mi equipo y yo ya estamos \
                     trabajando en tu muestra para que quede clara y útil."
                ),
                "En cuanto esté lista te comparto el enlace para que la revises desde \
                 tu celular."
                    .to_string(),
            ),
        };

        // Jitter keeps the follow-ups from looking scripted.
        let mut rng = rand::thread_rng();
        let d1 = Duration::seconds(60 + rng.gen_range(0..30));
        let d2 = Duration::seconds(115 + rng.gen_range(0..65));
        let now = Utc::now();
        for (msg, delay) in [(msg1, d1), (msg2, d2)] {
            if let Err(e) = self.engine.schedule_message(&lead.id, &msg, now + delay) {
                tracing::warn!("form follow-up not scheduled for {}: {e}", lead.id);
            }
        }

        Ok(LifecycleOutcome {
            already: false,
            scheduled_at: None,
            slug: (!lead.slug.is_empty()).then(|| lead.slug.clone()),
            lead_id: lead.id,
        })
    }

    /// The sample site link went out to the lead.
    ///
    /// Starts the bound sequence after a fixed offset — not immediately, to
    /// give the lead time to open the link first.
    pub fn sample_sent(&self, lead_ref: &LeadRef) -> Result<LifecycleOutcome> {
        let id = match (&lead_ref.lead_id, &lead_ref.phone) {
            (Some(id), _) => phone::lead_id(id)?,
            (None, Some(p)) => phone::lead_id(p)?,
            (None, None) => {
                return Err(LeadClawError::Validation(
                    "leadId or leadPhone required".into(),
                ));
            }
        };

        let existing_stage = self
            .store
            .get_lead(&id)?
            .map(|l| l.stage)
            .unwrap_or_default();
        let now = Utc::now();
        let lead = self.store.upsert_lead(
            &id,
            LeadPatch {
                stage: advance_stage(existing_stage, LeadStage::WebLinkSent),
                add_tags: vec!["WebLinkSent".into()],
                web_link_sent_at: Some(now),
                ..Default::default()
            },
        )?;

        let start_at = now + Duration::minutes(self.config.web_sent_delay_mins);
        self.engine
            .schedule_sequence(&lead.id, &self.config.web_sent_sequence, start_at)?;

        tracing::info!(
            "🔗 [{}] scheduled for {} at {}",
            self.config.web_sent_sequence,
            lead.id,
            start_at.to_rfc3339()
        );
        Ok(LifecycleOutcome {
            already: false,
            scheduled_at: Some(start_at),
            slug: (!lead.slug.is_empty()).then(|| lead.slug.clone()),
            lead_id: lead.id,
        })
    }

    /// The lead opened the tracking link. At most once per lead: replays
    /// return `already` and cause no further tagging, cancelling, or
    /// scheduling.
    pub fn link_opened(&self, lead_ref: &LeadRef) -> Result<LifecycleOutcome> {
        let lead = self.resolve(lead_ref)?;

        if lead.link_opened_at.is_some() {
            return Ok(LifecycleOutcome {
                already: true,
                scheduled_at: None,
                slug: (!lead.slug.is_empty()).then(|| lead.slug.clone()),
                lead_id: lead.id,
            });
        }

        let now = Utc::now();
        let lead = self.store.upsert_lead(
            &lead.id,
            LeadPatch {
                stage: advance_stage(lead.stage, LeadStage::LinkOpened),
                add_tags: vec!["LinkAbierto".into()],
                link_opened_at: Some(now),
                ..Default::default()
            },
        )?;

        // The nudge sequence for the unopened link is obsolete the moment
        // the link is opened. Best effort on both commands, like the rest
        // of the fire-and-forget contract.
        if let Err(e) = self
            .engine
            .cancel(&lead.id, &[self.config.web_sent_sequence.as_str()])
        {
            tracing::warn!("cancel {} for {} failed: {e}", self.config.web_sent_sequence, lead.id);
        }
        if let Err(e) =
            self.engine
                .schedule_sequence(&lead.id, &self.config.link_opened_sequence, now)
        {
            tracing::warn!(
                "start {} for {} failed: {e}",
                self.config.link_opened_sequence,
                lead.id
            );
        }

        Ok(LifecycleOutcome {
            already: false,
            scheduled_at: Some(now),
            slug: (!lead.slug.is_empty()).then(|| lead.slug.clone()),
            lead_id: lead.id,
        })
    }

    /// Resolve a recipient reference to an existing lead.
    fn resolve(&self, lead_ref: &LeadRef) -> Result<Lead> {
        let found = if let Some(id) = &lead_ref.lead_id {
            self.store.get_lead(&phone::lead_id(id)?)?
        } else if let Some(p) = &lead_ref.phone {
            self.store.get_lead_by_phone(p)?
        } else if let Some(slug) = &lead_ref.slug {
            self.store.get_lead_by_slug(slug)?
        } else {
            return Err(LeadClawError::Validation(
                "leadId, leadPhone or slug required".into(),
            ));
        };
        found.ok_or_else(|| LeadClawError::NotFound("lead not found".into()))
    }
}
