use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use tracing::{debug, info};
use uuid::Uuid;

use crate::models::Appointment;

pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 10_000;

#[derive(Debug, Clone)]
struct CacheEntry {
    appointment: Appointment,
    tags: Vec<String>,
    created_at: DateTime<Utc>,
    access_count: u64,
}

impl CacheEntry {
    fn is_expired(&self, ttl: Duration) -> bool {
        let age = Utc::now() - self.created_at;
        age.to_std().unwrap_or(Duration::MAX) > ttl
    }
}

/// Invalidation generation observed before a store read.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FillTicket(u64);

/// Read cache for single appointments, invalidated by tag.
///
/// Each entry carries the tags `appointment:{id}`, `dietitian:{id}` and
/// `client:{id}` so a change can drop everything it touches. The cache holds
/// at most `max_entries`; beyond that the least used tenth is evicted.
///
/// Fills go through [`FillTicket`]s: a row read from the store is only
/// cached if no invalidation happened while it was being read.
#[derive(Clone)]
pub struct AppointmentCache {
    entries: Arc<RwLock<HashMap<Uuid, CacheEntry>>>,
    generation: Arc<AtomicU64>,
    ttl: Duration,
    max_entries: usize,
}

impl AppointmentCache {
    pub fn new(ttl: Duration) -> Self {
        Self::with_capacity(ttl, DEFAULT_CACHE_MAX_ENTRIES)
    }

    pub fn with_capacity(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: Arc::new(RwLock::new(HashMap::new())),
            generation: Arc::new(AtomicU64::new(0)),
            ttl,
            max_entries: max_entries.max(1),
        }
    }

    pub fn tags_for(appointment: &Appointment) -> Vec<String> {
        vec![
            format!("appointment:{}", appointment.id),
            format!("dietitian:{}", appointment.dietitian),
            format!("client:{}", appointment.client),
        ]
    }

    pub async fn get(&self, id: Uuid) -> Option<Appointment> {
        let mut entries = self.entries.write().await;

        let expired = match entries.get_mut(&id) {
            Some(entry) if !entry.is_expired(self.ttl) => {
                entry.access_count += 1;
                debug!("Appointment cache hit: {} (access_count={})", id, entry.access_count);
                return Some(entry.appointment.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.remove(&id);
        }
        debug!("Appointment cache miss: {}", id);
        None
    }

    /// Takes a ticket before reading from the store.
    pub fn fill_ticket(&self) -> FillTicket {
        FillTicket(self.generation.load(Ordering::Acquire))
    }

    /// Caches a row read under `ticket`. Returns false when an invalidation
    /// raced the read, or a newer version is already cached.
    pub async fn fill(&self, appointment: Appointment, ticket: FillTicket) -> bool {
        let mut entries = self.entries.write().await;

        if self.generation.load(Ordering::Acquire) != ticket.0 {
            debug!("Skipping cache fill for {}: invalidated during read", appointment.id);
            return false;
        }
        if let Some(existing) = entries.get(&appointment.id) {
            if existing.appointment.version > appointment.version {
                return false;
            }
        }

        self.put(&mut entries, appointment);
        true
    }

    pub async fn insert(&self, appointment: Appointment) {
        let mut entries = self.entries.write().await;
        self.put(&mut entries, appointment);
    }

    fn put(&self, entries: &mut HashMap<Uuid, CacheEntry>, appointment: Appointment) {
        if !entries.contains_key(&appointment.id) {
            self.evict_if_needed(entries);
        }

        let entry = CacheEntry {
            tags: Self::tags_for(&appointment),
            appointment,
            created_at: Utc::now(),
            access_count: 0,
        };
        entries.insert(entry.appointment.id, entry);
    }

    fn evict_if_needed(&self, entries: &mut HashMap<Uuid, CacheEntry>) {
        if entries.len() < self.max_entries {
            return;
        }
        entries.retain(|_, entry| !entry.is_expired(self.ttl));
        if entries.len() < self.max_entries {
            return;
        }

        // Least accessed first, oldest breaking ties.
        let mut ranked: Vec<(Uuid, u64, DateTime<Utc>)> = entries
            .iter()
            .map(|(id, entry)| (*id, entry.access_count, entry.created_at))
            .collect();
        ranked.sort_by(|a, b| a.1.cmp(&b.1).then(a.2.cmp(&b.2)));

        let to_remove = (entries.len() - self.max_entries + 1).max(entries.len() / 10);
        for (id, _, _) in ranked.into_iter().take(to_remove) {
            entries.remove(&id);
        }
        info!("Appointment cache evicted {} entries", to_remove);
    }

    /// Drops every entry carrying `tag`. Returns how many were removed.
    pub async fn invalidate_tag(&self, tag: &str) -> usize {
        let mut entries = self.entries.write().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        let before = entries.len();
        entries.retain(|_, entry| !entry.tags.iter().any(|t| t == tag));
        let removed = before - entries.len();

        if removed > 0 {
            debug!("Invalidated {} cached appointments for tag {}", removed, tag);
        }
        removed
    }

    /// Drops everything tagged by any of the appointment's tags.
    pub async fn invalidate(&self, appointment: &Appointment) {
        let tags: HashSet<String> = Self::tags_for(appointment).into_iter().collect();
        let mut entries = self.entries.write().await;
        self.generation.fetch_add(1, Ordering::AcqRel);
        entries.retain(|_, entry| !entry.tags.iter().any(|t| tags.contains(t)));
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

impl Default for AppointmentCache {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_TTL)
    }
}
