//! Event ingest pipeline and post-commit notification dispatch (spec
//! §4.G-H): owns the object store, the incident registry, a read handle
//! onto the runtime config graph, and the per-channel plugin supervisors,
//! and wires them through the full per-event sequence.

use crate::age_hint::next_evaluation_hint;
use crate::escalation_context::EscalationFilterContext;
use crate::object_context::ObjectFilterContext;
use crate::persistence;
use crate::recipients::{expand_recipient, select_channel, time_period_map};
use crate::routing_context::RoutingFilterContext;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use nd_common::{Event, EventType, Incident, NotifydError, Object, Result, RuleEntryType, Severity};
use nd_configstore::ConfigGraph;
use nd_filter::eval::eval as eval_filter;
use nd_filter::parser::parse as parse_filter;
use nd_incident::{earliest, IncidentTimer};
use nd_object::ObjectStore;
use nd_plugin::protocol::METHOD_SEND_NOTIFICATION;
use nd_plugin::PluginSupervisor;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock as AsyncRwLock;
use tracing::{error, warn};

const PLUGIN_CALL_TIMEOUT: Duration = Duration::from_secs(30);

pub struct EventRouter {
    pool: PgPool,
    config: Arc<AsyncRwLock<ConfigGraph>>,
    objects: Arc<ObjectStore>,
    incidents: Arc<nd_incident::IncidentRegistry>,
    timers: DashMap<i64, Arc<IncidentTimer>>,
    plugins: DashMap<i64, Arc<PluginSupervisor>>,
}

/// What survives the synchronous per-incident-locked section of
/// [`EventRouter::process`] into the async persistence/dispatch section.
struct PreparedEvent {
    incident: Incident,
    pending: Vec<PendingRow>,
    next_evaluation_candidates: Vec<Option<DateTime<Utc>>>,
}

struct PendingRow {
    rule_entry_id: i64,
    contact_id: i64,
    channel_id: i64,
}

impl EventRouter {
    pub fn new(
        pool: PgPool,
        config: Arc<AsyncRwLock<ConfigGraph>>,
        objects: Arc<ObjectStore>,
        incidents: Arc<nd_incident::IncidentRegistry>,
    ) -> Arc<Self> {
        Arc::new(Self {
            pool,
            config,
            objects,
            incidents,
            timers: DashMap::new(),
            plugins: DashMap::new(),
        })
    }

    pub fn register_plugin(&self, channel_id: i64, supervisor: Arc<PluginSupervisor>) {
        self.plugins.insert(channel_id, supervisor);
    }

    /// Spec §4.G `Process(event) -> error`.
    pub async fn process(self: &Arc<Self>, event: Event) -> Result<()> {
        if event.id_tags.is_empty() {
            return Err(NotifydError::MissingIdTags);
        }

        let config = self.config.read().await;
        if !config.sources.contains_key(&event.source_id) {
            return Err(NotifydError::UnknownSource(event.source_id));
        }

        let object_id = nd_object::compute_object_id(event.source_id, &event.id_tags);
        let was_muted_before = self.objects.snapshot(&object_id).is_some_and(|o| o.is_muted());

        // Spec §4.G's pipeline is one transaction per event, starting with
        // the object upsert (step 2); everything through the commit below
        // shares this transaction, so a later failure rolls it back too.
        let mut tx = self.pool.begin().await.map_err(|e| NotifydError::TransientDb(e.to_string()))?;
        let object = self.objects.apply_event(&mut tx, &event).await?;

        let actor_lock = self.incidents.actor_for(object.id);
        let mut actor = actor_lock.lock().await;

        if !actor.is_open() {
            if event.severity.is_problem() {
                let incident_id = persistence::next_incident_id(&self.pool).await?;
                actor.open(incident_id, object.id, event.severity, event.time);
            } else if event.severity == Severity::Ok && !event.kind.is_mute_unmute() {
                drop(actor);
                drop(config);
                tx.commit().await.map_err(|e| NotifydError::TransientDb(e.to_string()))?;
                self.objects.publish(object);
                return Err(NotifydError::SuperfluousStateChange);
            } else {
                drop(actor);
                drop(config);
                // Mute/unmute or a no-op severity with nothing open: persist
                // the event row for the audit trail and stop; there is no
                // incident to escalate or route against.
                persistence::persist_event_row(&mut tx, &event, &object.id).await?;
                tx.commit().await.map_err(|e| NotifydError::TransientDb(e.to_string()))?;
                self.objects.publish(object);
                return Ok(());
            }
        }

        let outcome = actor.process_event(event.kind, event.severity, event.time);
        let prepared = self.evaluate(&config, &object, &mut actor, &event);
        drop(actor);
        drop(config);

        persistence::persist_event_row(&mut tx, &event, &object.id).await?;
        persistence::upsert_incident_row(&mut tx, &prepared.incident).await?;
        if let Some(note) = &outcome.history_note {
            persistence::persist_history_note(&mut tx, prepared.incident.id, note, event.time).await?;
        }

        let suppressed = object.is_muted() && was_muted_before;
        let mut dispatchable = Vec::new();
        for row in &prepared.pending {
            let id = persistence::next_notification_id(&self.pool).await?;
            let state = if suppressed { "suppressed" } else { "pending" };
            let recipient = nd_common::RecipientRef::Contact { contact_id: row.contact_id };
            persistence::persist_notification_row(
                &mut tx,
                id,
                Some(prepared.incident.id),
                Some(row.rule_entry_id),
                &recipient,
                event.time,
                row.channel_id,
                state,
            )
            .await?;
            if !suppressed {
                dispatchable.push((id, row.channel_id, row.contact_id));
            }
        }

        tx.commit().await.map_err(|e| NotifydError::TransientDb(e.to_string()))?;
        let object = self.objects.publish(object);

        if let Some(at) = earliest(prepared.next_evaluation_candidates) {
            self.arm_timer(prepared.incident.id, Arc::clone(&object), at);
        }

        for (notification_id, channel_id, contact_id) in dispatchable {
            let router = Arc::clone(self);
            let object = Arc::clone(&object);
            let event = event.clone();
            let incident_id = prepared.incident.id;
            tokio::spawn(async move {
                router.dispatch_one(notification_id, channel_id, contact_id, object, event, incident_id).await;
            });
        }

        Ok(())
    }

    /// Spec §4.G steps 7-10, entirely synchronous: rule matching,
    /// escalation/routing entry evaluation, and recipient expansion. Holds
    /// the incident actor's lock and the config read lock only; no
    /// suspension happens here.
    fn evaluate(
        &self,
        config: &ConfigGraph,
        object: &Object,
        actor: &mut nd_incident::IncidentActor,
        event: &Event,
    ) -> PreparedEvent {
        for (rule_id, rule) in &config.rules {
            if actor.has_matched_rule(*rule_id) || !rule.active {
                continue;
            }
            let object_matches = match &rule.object_filter_expr {
                None => true,
                Some(expr) => {
                    let ctx = ObjectFilterContext::new(object);
                    parse_filter(expr).map(|f| eval_filter(&f, &ctx)).unwrap_or(false)
                }
            };
            if object_matches {
                actor.record_rule_match(*rule_id);
            }
        }

        let incident = actor.incident.clone().expect("incident present: opened above or already open");
        let age = incident.age(event.time);
        let mut next_evaluation_candidates = Vec::new();
        let mut pending = Vec::new();
        let time_periods = time_period_map(config);

        for rule_id in &incident.rule_match_set {
            let Some(rule) = config.rules.get(rule_id) else { continue };
            if let Some(tp_id) = rule.time_period_id {
                if let Some(tp) = config.time_period(tp_id) {
                    next_evaluation_candidates.push(Some(tp.next_transition(event.time)));
                }
            }

            for entry_id in &rule.entries {
                let Some(entry) = config.rule_entries.get(entry_id) else { continue };

                match entry.kind {
                    RuleEntryType::Escalation => {
                        let matches = match &entry.condition_expr {
                            None => true,
                            Some(expr) => {
                                let ctx = EscalationFilterContext {
                                    incident_age: age,
                                    incident_severity: incident.severity,
                                };
                                parse_filter(expr).map(|f| eval_filter(&f, &ctx)).unwrap_or(false)
                            }
                        };
                        if !matches {
                            if !actor.has_triggered_entry(*entry_id) {
                                if let Some(expr) = &entry.condition_expr {
                                    if let Ok(filter) = parse_filter(expr) {
                                        if let Some(hint) = next_evaluation_hint(&filter, age) {
                                            next_evaluation_candidates.push(Some(event.time + hint));
                                        }
                                    }
                                }
                            }
                            continue;
                        }
                        if !actor.has_triggered_entry(*entry_id) {
                            actor.record_entry_trigger(*entry_id, event.time);
                        }
                    }
                    RuleEntryType::Routing => {
                        let ctx = RoutingFilterContext { event_type: event_type_label(&event.kind) };
                        let matches = match &entry.condition_expr {
                            None => true,
                            Some(expr) => parse_filter(expr).map(|f| eval_filter(&f, &ctx)).unwrap_or(false),
                        };
                        if !matches {
                            continue;
                        }
                    }
                }

                for recipient_id in &entry.recipients {
                    let Some(er) = config.rule_entry_recipients.get(recipient_id) else { continue };
                    let contact_ids = expand_recipient(&er.recipient, config, &time_periods, event.time);
                    for contact_id in contact_ids {
                        let Some(contact) = config.hydrated_contact(contact_id) else { continue };
                        let Some(channel_id) = select_channel(er.channel_id, contact.default_channel_id)
                        else {
                            continue;
                        };
                        pending.push(PendingRow { rule_entry_id: *entry_id, contact_id, channel_id });
                    }
                }
            }
        }

        PreparedEvent { incident, pending, next_evaluation_candidates }
    }

    fn arm_timer(self: &Arc<Self>, incident_id: i64, object: Arc<Object>, at: DateTime<Utc>) {
        let timer = self.timers.entry(incident_id).or_insert_with(|| Arc::new(IncidentTimer::new())).clone();
        let router = Arc::clone(self);
        timer.arm(at, move || async move {
            let Ok(event_id) = persistence::next_event_id(&router.pool).await else { return };
            let internal_event = Event {
                id: event_id,
                source_id: object.source_id,
                time: Utc::now(),
                kind: EventType::Internal,
                severity: Severity::None,
                name: object.name.clone(),
                url: object.url.clone(),
                username: None,
                message: Some("incident reached scheduled re-evaluation age".to_string()),
                id_tags: object.id_tags.clone(),
                extra_tags: object.extra_tags.clone(),
                mute: None,
                mute_reason: None,
            };
            if let Err(e) = router.process(internal_event).await {
                warn!(incident_id, error = %e, "re-evaluation event failed");
            }
        });
    }

    async fn dispatch_one(
        self: Arc<Self>,
        notification_id: i64,
        channel_id: i64,
        contact_id: i64,
        object: Arc<Object>,
        event: Event,
        incident_id: i64,
    ) {
        let Some(supervisor) = self.plugins.get(&channel_id).map(|s| s.clone()) else {
            warn!(notification_id, channel_id, "unknown channel, marking failed");
            let _ = persistence::mark_notification_result(
                &self.pool,
                notification_id,
                "failed",
                Utc::now(),
                Some("unknown channel"),
            )
            .await;
            return;
        };

        let contact = {
            let config = self.config.read().await;
            config.hydrated_contact(contact_id)
        };

        let params = json!({
            "object": &*object,
            "event": &event,
            "incident_id": incident_id,
            "contact": contact,
        });

        let handle = supervisor.current_ready().await;
        let (state, message) = match handle.call(METHOD_SEND_NOTIFICATION, params, PLUGIN_CALL_TIMEOUT).await
        {
            Ok(_) => ("sent", None),
            Err(e) => {
                error!(notification_id, channel_id, error = %e, "notification send failed");
                ("failed", Some(e.to_string()))
            }
        };

        if let Err(e) = persistence::mark_notification_result(
            &self.pool,
            notification_id,
            state,
            Utc::now(),
            message.as_deref(),
        )
        .await
        {
            error!(notification_id, error = %e, "failed to record notification result");
        }
    }
}

fn event_type_label(kind: &EventType) -> String {
    use nd_common::Phase;
    match kind {
        EventType::State => "state",
        EventType::Custom => "custom",
        EventType::Mute => "mute",
        EventType::Unmute => "unmute",
        EventType::Internal => "internal",
        EventType::Acknowledgement(Phase::Start) => "acknowledgement-start",
        EventType::Acknowledgement(Phase::End) => "acknowledgement-end",
        EventType::Downtime(Phase::Start) => "downtime-start",
        EventType::Downtime(Phase::End) => "downtime-end",
        EventType::Flapping(Phase::Start) => "flapping-start",
        EventType::Flapping(Phase::End) => "flapping-end",
    }
    .to_string()
}
