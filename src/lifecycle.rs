// src/lifecycle.rs
//
// The ride lifecycle state machine. Every mutation of `stage` in the store
// funnels through this controller, whether the trigger is a local user
// action or a server push, so racing sources resolve to "last valid
// transition wins" and everything else becomes a no-op.

use std::sync::{Arc, Mutex, Weak};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::AppConfig;
use crate::errors::{KekeError, KekeResult};
use crate::map::haversine_distance_m;
use crate::models::{LocationPoint, RideRating, RideRequest, RideStage, RouteKind};
use crate::realtime::{ChannelEvent, EventChannel, RideEvent};
use crate::services::api::RiderApi;
use crate::services::chat::ChatSession;
use crate::services::notifier::{Effect, Haptic, RiderNotifier};
use crate::store::{RideState, RideStateStore};

/// Average Keke speed used to estimate trip duration before the backend
/// returns a route.
const AVERAGE_SPEED_KMH: f64 = 20.0;

/// Room announcement seam; the realtime channel in production.
#[async_trait]
pub trait RoomAnnouncer: Send + Sync {
    async fn announce_room(&self, ride_id: &str);
}

#[async_trait]
impl RoomAnnouncer for EventChannel {
    async fn announce_room(&self, ride_id: &str) {
        self.join_room(ride_id).await;
    }
}

pub struct RideLifecycleController {
    store: Arc<RideStateStore>,
    api: Arc<dyn RiderApi>,
    notifier: Arc<dyn RiderNotifier>,
    rooms: Arc<dyn RoomAnnouncer>,
    config: AppConfig,
    // Handle to ourselves for the spawned timer tasks.
    weak: Weak<Self>,
    nearby_task: Mutex<Option<JoinHandle<()>>>,
    eta_task: Mutex<Option<JoinHandle<()>>>,
}

impl RideLifecycleController {
    pub fn new(
        store: Arc<RideStateStore>,
        api: Arc<dyn RiderApi>,
        notifier: Arc<dyn RiderNotifier>,
        rooms: Arc<dyn RoomAnnouncer>,
        config: AppConfig,
    ) -> Arc<Self> {
        Arc::new_cyclic(|weak| Self {
            store,
            api,
            notifier,
            rooms,
            config,
            weak: weak.clone(),
            nearby_task: Mutex::new(None),
            eta_task: Mutex::new(None),
        })
    }

    pub fn store(&self) -> &Arc<RideStateStore> {
        &self.store
    }

    fn notify(&self, effect: Effect) {
        self.notifier.notify(effect);
    }

    fn set_stage(&self, to: RideStage) {
        let from = self.store.stage();
        if from != to {
            info!(from = ?from, to = ?to, "Ride stage transition");
        }
        self.store.set_stage(to);
    }

    fn stage_no_op(&self, trigger: &str) {
        debug!(stage = ?self.store.stage(), trigger = trigger, "Ignoring trigger for current stage");
    }

    /// Advance the ride stage, routing through the recorded return stage when
    /// the chat overlay is on top so the modal survives the transition.
    fn advance_underlying(&self, state: &RideState, to: RideStage) {
        if state.stage == RideStage::Chat {
            info!(to = ?to, "Ride advanced behind the chat overlay");
            self.store.set_chat_return_stage(Some(to));
        } else {
            self.set_stage(to);
        }
    }

    // -- Local user actions -------------------------------------------------

    /// `initial -> input`: rider tapped "where to".
    pub fn tap_where_to(&self) {
        if self.store.stage() != RideStage::Initial {
            self.stage_no_op("tap_where_to");
            return;
        }
        self.set_stage(RideStage::Input);
        self.notify(Effect::OpenDestinationSelector);
    }

    /// `input -> confirm` (or straight from `initial` when a recent
    /// destination already carries full coordinates). Stores the destination
    /// and kicks off a fare estimate.
    pub async fn choose_destination(&self, destination: LocationPoint) -> KekeResult<()> {
        if !matches!(self.store.stage(), RideStage::Initial | RideStage::Input) {
            self.stage_no_op("choose_destination");
            return Ok(());
        }
        if !destination.is_valid() {
            return Err(KekeError::validation_error(
                "destination",
                "address and both coordinates are required",
            ));
        }

        self.store.set_destination(destination);
        self.estimate_trip().await;
        self.set_stage(RideStage::Confirm);
        self.stop_nearby_polling();
        Ok(())
    }

    /// Distance/duration estimate plus fare quote for the confirm sheet.
    /// Failures degrade to no fare shown; they never block booking.
    async fn estimate_trip(&self) {
        let state = self.store.snapshot();
        let (Some(from), Some(to)) = (state.pickup.coords.to_geo(), state.destination.coords.to_geo())
        else {
            return;
        };
        let distance_km = haversine_distance_m(from, to) / 1000.0;
        let duration_min = distance_km / AVERAGE_SPEED_KMH * 60.0;
        self.store.set_trip_metrics(distance_km, duration_min);

        match self.api.calculate_fare(distance_km, duration_min).await {
            Ok(quote) => {
                self.store.set_fare(Some(quote.estimated_fare));
                self.store.set_trip_metrics(distance_km, quote.duration_in_minutes);
            }
            Err(e) => {
                warn!(error = %e, "Fare estimate failed, showing no fare");
                self.store.set_fare(None);
            }
        }
    }

    /// `confirm -> input` / `input -> initial`. Returning all the way to
    /// `initial` clears the chosen destination.
    pub fn back_out(&self) {
        match self.store.stage() {
            RideStage::Confirm => self.set_stage(RideStage::Input),
            RideStage::Input => {
                self.store.set_destination(LocationPoint::default());
                self.set_stage(RideStage::Initial);
            }
            _ => self.stage_no_op("back_out"),
        }
    }

    /// `confirm -> search` on a successful booking. Failure keeps the stage
    /// and surfaces a retryable notice.
    pub async fn confirm_booking(&self) -> KekeResult<()> {
        if self.store.stage() != RideStage::Confirm {
            self.stage_no_op("confirm_booking");
            return Ok(());
        }
        let state = self.store.snapshot();
        let request = RideRequest {
            pickup_location: state.pickup.clone(),
            dropoff_location: state.destination.clone(),
            payment_method: self.config.default_payment_method.clone(),
            distance_in_km: state.distance_km,
            duration_in_minutes: state.duration_min,
        };

        match self.api.request_ride(&request).await {
            Ok(response) if response.ride.status == "requested" => {
                let ride_id = response.ride.id;
                info!(ride_id = %ride_id, "Ride requested");
                self.store.set_ride_id(Some(ride_id.clone()));
                self.set_stage(RideStage::Search);
                self.rooms.announce_room(&ride_id).await;
                Ok(())
            }
            Ok(response) => {
                warn!(status = %response.ride.status, "Unexpected booking status");
                self.notify(Effect::RetryableError(
                    "Could not request a ride, please try again".to_string(),
                ));
                Err(KekeError::bad_request(format!(
                    "unexpected ride status '{}'",
                    response.ride.status
                )))
            }
            Err(e) => {
                warn!(error = %e, "Ride request failed");
                self.notify(Effect::RetryableError(
                    "Could not request a ride, please try again".to_string(),
                ));
                Err(e)
            }
        }
    }

    /// Cancel the active ride. Refused outright once the trip has started,
    /// matching the disabled UI affordance; HTTP failure leaves the stage
    /// unchanged with a retryable notice.
    pub async fn cancel_ride(&self, reason: Option<&str>) -> KekeResult<()> {
        let state = self.store.snapshot();
        match state.stage {
            RideStage::Trip => {
                self.notify(Effect::Blocked(
                    "You can't cancel a ride in progress".to_string(),
                ));
                return Err(KekeError::CancelBlocked);
            }
            RideStage::Search | RideStage::Paired | RideStage::Arrived => {}
            _ => {
                self.stage_no_op("cancel_ride");
                return Ok(());
            }
        }
        let ride_id = state.ride_id.ok_or(KekeError::NoActiveRide)?;

        match self.api.cancel_ride(&ride_id, reason).await {
            Ok(_) => {
                info!(ride_id = %ride_id, "Ride cancelled by rider");
                self.reset_to_initial();
                self.notify(Effect::Toast("Ride cancelled".to_string()));
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Cancel request failed");
                self.notify(Effect::RetryableError(
                    "Could not cancel the ride, please try again".to_string(),
                ));
                Err(e)
            }
        }
    }

    /// `paired/arrived/trip -> chat`, remembering where we came from.
    pub fn open_chat(&self) {
        let stage = self.store.stage();
        if !stage.allows_chat() {
            self.stage_no_op("open_chat");
            return;
        }
        self.store.set_chat_return_stage(Some(stage));
        self.set_stage(RideStage::Chat);
    }

    /// `chat -> originating stage`. Prefers the recorded origin and falls
    /// back to inferring it: driver with an ETA means the trip is running,
    /// driver without one means they are at the door, else still paired.
    pub fn close_chat(&self) {
        if self.store.stage() != RideStage::Chat {
            self.stage_no_op("close_chat");
            return;
        }
        let state = self.store.snapshot();
        let target = chat_return_stage(&state);
        self.store.set_chat_return_stage(None);
        self.set_stage(target);
    }

    /// Post-trip rating. Success finishes the reset back to `initial`;
    /// failure keeps the rating screen retryable.
    pub async fn submit_rating(&self, rating: RideRating) -> KekeResult<()> {
        match self.api.submit_rating(&rating).await {
            Ok(()) => {
                self.notify(Effect::Toast("Thanks for the feedback!".to_string()));
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Rating submission failed");
                self.notify(Effect::RetryableError(
                    "Could not submit your rating, please try again".to_string(),
                ));
                Err(e)
            }
        }
    }

    // -- Server-pushed events ----------------------------------------------

    /// Apply one event from the realtime channel. Events whose precondition
    /// stage does not match the current stage are no-ops; this is what makes
    /// duplicate terminal events and accepted-after-cancel races harmless.
    pub async fn handle_event(&self, event: RideEvent) {
        match event {
            RideEvent::Accepted { driver } => {
                let state = self.store.snapshot();
                if state.stage != RideStage::Search || state.ride_id.is_none() {
                    // Locally cancelled before the acceptance arrived.
                    self.stage_no_op("ride:accepted");
                    return;
                }
                info!(driver = %driver.name, "Driver accepted the ride");
                let name = driver.name.clone();
                self.store.set_driver(Some(driver));
                self.set_stage(RideStage::Paired);
                self.notify(Effect::Haptic(Haptic::Success));
                self.notify(Effect::Toast(format!("{} is on the way!", name)));
                self.start_eta_countdown();
            }
            RideEvent::Arrived => {
                let state = self.store.snapshot();
                if effective_stage(&state) != RideStage::Paired {
                    self.stage_no_op("ride:arrived");
                    return;
                }
                self.advance_underlying(&state, RideStage::Arrived);
                self.notify(Effect::Haptic(Haptic::Success));
                self.notify(Effect::Toast("Your Keke has arrived".to_string()));
            }
            RideEvent::Started => {
                let state = self.store.snapshot();
                if effective_stage(&state) != RideStage::Arrived {
                    self.stage_no_op("ride:started");
                    return;
                }
                self.advance_underlying(&state, RideStage::Trip);
                self.notify(Effect::Haptic(Haptic::Success));
                self.notify(Effect::Toast("Trip started, enjoy the ride".to_string()));
            }
            RideEvent::Completed => {
                let state = self.store.snapshot();
                if effective_stage(&state) != RideStage::Trip {
                    self.stage_no_op("ride:completed");
                    return;
                }
                let ride_id = state.ride_id.unwrap_or_default();
                info!(ride_id = %ride_id, "Ride completed");
                self.store.mark_completion_seen();
                self.notify(Effect::Haptic(Haptic::Success));
                self.notify(Effect::NavigateToRating { ride_id });
                self.reset_to_initial();
            }
            RideEvent::Cancelled { reason } => {
                if !self.store.stage().is_active() {
                    self.stage_no_op("ride:cancelled");
                    return;
                }
                let reason = reason.unwrap_or_else(|| "The ride was cancelled".to_string());
                info!(reason = %reason, "Ride cancelled by server");
                self.reset_to_initial();
                self.notify(Effect::Toast(reason));
            }
            RideEvent::DriverLocation { location } => {
                // Position only; never a stage change. The store drops it
                // when no driver is matched.
                self.store.set_driver_location(location);
            }
            RideEvent::RouteUpdated { route_type, directions } => {
                // A stale push after a reset must not repopulate routes or
                // resurrect an ETA while idle.
                let state = self.store.snapshot();
                if !state.stage.is_active() || state.ride_id.is_none() {
                    self.stage_no_op("driver:route-updated");
                    return;
                }
                let eta = directions.duration.round() as i64;
                self.store.set_route(route_type, Some(directions));
                if route_type == self.current_route_concern() {
                    self.store.set_eta_minutes(Some(eta));
                }
            }
            RideEvent::MessageReceived { .. } => {
                // Routed to the chat session by the event pump.
            }
        }
    }

    /// After a transport reconnect, ask the backend where the active ride
    /// actually is. A terminal status reached while offline is applied
    /// directly, since the events that carried it are gone; anything else is
    /// left for the channel to deliver.
    pub async fn reconcile_after_reconnect(&self) {
        let state = self.store.snapshot();
        if !state.stage.is_active() {
            return;
        }
        let Some(ride_id) = state.ride_id else {
            return;
        };
        match self.api.ride_status(&ride_id).await {
            Ok(record) => match record.status.as_str() {
                "cancelled" => {
                    info!(ride_id = %ride_id, "Ride was cancelled while offline");
                    self.reset_to_initial();
                    self.notify(Effect::Toast("Your ride was cancelled".to_string()));
                }
                "completed" => {
                    info!(ride_id = %ride_id, "Ride completed while offline");
                    self.store.mark_completion_seen();
                    self.notify(Effect::NavigateToRating {
                        ride_id: ride_id.clone(),
                    });
                    self.reset_to_initial();
                }
                status => {
                    debug!(status = %status, "Ride still live after reconnect");
                }
            },
            Err(e) => warn!(error = %e, "Ride status check failed after reconnect"),
        }
    }

    /// Which route the rider currently cares about: the driver's approach
    /// before the trip, the trip route after. A pickup-route ETA must not
    /// overwrite an active-trip ETA, and vice versa.
    fn current_route_concern(&self) -> RouteKind {
        match effective_stage(&self.store.snapshot()) {
            RideStage::Trip => RouteKind::Destination,
            _ => RouteKind::Pickup,
        }
    }

    fn reset_to_initial(&self) {
        self.stop_eta_countdown();
        self.store.reset_ride();
        self.set_stage(RideStage::Initial);
        // Back on the idle map: resume showing nearby Kekes.
        self.start_nearby_polling();
    }

    // -- Timers -------------------------------------------------------------

    /// Poll nearby drivers while idling on the map. Errors degrade to an
    /// empty list; the task stops itself once the stage leaves `initial`.
    pub fn start_nearby_polling(&self) {
        let mut slot = self.nearby_task.lock().expect("timer lock poisoned");
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let Some(controller) = self.weak.upgrade() else {
            return;
        };
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(controller.config.nearby_poll_interval);
            loop {
                ticker.tick().await;
                let state = controller.store.snapshot();
                if state.stage != RideStage::Initial {
                    break;
                }
                match controller.api.nearby_drivers(&state.pickup.coords).await {
                    Ok(drivers) => controller.store.set_nearby_drivers(drivers),
                    Err(e) => {
                        warn!(error = %e, "Nearby drivers poll failed");
                        controller.store.set_nearby_drivers(Vec::new());
                    }
                }
            }
        }));
    }

    pub fn stop_nearby_polling(&self) {
        if let Some(handle) = self.nearby_task.lock().expect("timer lock poisoned").take() {
            handle.abort();
        }
    }

    /// Local ETA ticker: decrements once per minute between server updates
    /// for as long as the ride is active. A countdown reaching zero arms a
    /// grace timer; the force-reset fires only when the trip itself ran out
    /// with no `ride:completed` observed. Ticking continues after a zero so
    /// a later server update is decremented again.
    fn start_eta_countdown(&self) {
        let mut slot = self.eta_task.lock().expect("timer lock poisoned");
        if slot.as_ref().is_some_and(|handle| !handle.is_finished()) {
            return;
        }
        let Some(controller) = self.weak.upgrade() else {
            return;
        };
        *slot = Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(std::time::Duration::from_secs(60));
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
            ticker.tick().await; // first tick fires immediately
            let mut previous = None;
            loop {
                ticker.tick().await;
                if !controller.store.stage().is_active() {
                    break;
                }
                let remaining = controller.store.tick_eta();
                // Arm the fallback once per zero crossing, not every minute.
                if remaining == Some(0) && previous != Some(0) {
                    tokio::time::sleep(controller.config.completion_grace).await;
                    let state = controller.store.snapshot();
                    if should_force_expire(&state) {
                        warn!("No completion event within grace period, resetting ride");
                        controller.reset_to_initial();
                        controller.notify(Effect::Toast("Your ride has ended".to_string()));
                        break;
                    }
                }
                previous = remaining;
            }
        }));
    }

    fn stop_eta_countdown(&self) {
        if let Some(handle) = self.eta_task.lock().expect("timer lock poisoned").take() {
            handle.abort();
        }
    }
}

/// Stage to restore when the chat overlay closes.
fn chat_return_stage(state: &RideState) -> RideStage {
    if let Some(stage) = state.chat_return_stage {
        return stage;
    }
    match (&state.driver, state.eta_minutes) {
        (Some(_), Some(_)) => RideStage::Trip,
        (Some(_), None) => RideStage::Arrived,
        (None, _) => RideStage::Paired,
    }
}

/// Stage as the lifecycle sees it: the chat overlay is transparent, the
/// stage underneath it is what counts.
fn effective_stage(state: &RideState) -> RideStage {
    if state.stage == RideStage::Chat {
        chat_return_stage(state)
    } else {
        state.stage
    }
}

/// Guard for the countdown fallback: only a trip that ran out with no
/// observed completion may be force-reset. A pickup ETA reaching zero while
/// the driver is still en route never resets the ride.
fn should_force_expire(state: &RideState) -> bool {
    effective_stage(state) == RideStage::Trip && !state.completion_seen
}

/// Drain channel events in arrival order into the controller and chat
/// session. Runs until the channel task goes away (logout).
pub async fn run_event_pump(
    controller: Arc<RideLifecycleController>,
    chat: Arc<ChatSession>,
    notifier: Arc<dyn RiderNotifier>,
    mut events: mpsc::Receiver<ChannelEvent>,
) {
    while let Some(event) = events.recv().await {
        match event {
            ChannelEvent::Ride(RideEvent::MessageReceived { message }) => {
                if chat.on_message_received(message) {
                    notifier.notify(Effect::NewMessage);
                }
            }
            ChannelEvent::Ride(ride_event) => controller.handle_event(ride_event).await,
            ChannelEvent::Connected => {
                debug!("Realtime channel connected");
                controller.reconcile_after_reconnect().await;
            }
            ChannelEvent::Disconnected => debug!("Realtime channel disconnected"),
            ChannelEvent::Error(error) => warn!(error = %error, "Realtime channel error"),
        }
    }
}

// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{Driver, DriverLocation, GeoPoint, RouteDirections};
    use crate::services::api::MockRiderApi;
    use crate::services::notifier::MockNotifier;
    use std::sync::atomic::Ordering;
    use std::time::Duration;

    #[derive(Default)]
    struct MockRooms {
        announced: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl RoomAnnouncer for MockRooms {
        async fn announce_room(&self, ride_id: &str) {
            self.announced.lock().unwrap().push(ride_id.to_string());
        }
    }

    struct Harness {
        controller: Arc<RideLifecycleController>,
        api: Arc<MockRiderApi>,
        notifier: Arc<MockNotifier>,
        rooms: Arc<MockRooms>,
        store: Arc<RideStateStore>,
    }

    fn harness() -> Harness {
        harness_with(AppConfig::default())
    }

    fn harness_with(config: AppConfig) -> Harness {
        let store = RideStateStore::new();
        let api = Arc::new(MockRiderApi::new());
        let notifier = Arc::new(MockNotifier::new());
        let rooms = Arc::new(MockRooms::default());
        let controller = RideLifecycleController::new(
            Arc::clone(&store),
            Arc::clone(&api) as Arc<dyn RiderApi>,
            Arc::clone(&notifier) as Arc<dyn RiderNotifier>,
            Arc::clone(&rooms) as Arc<dyn RoomAnnouncer>,
            config,
        );
        store.set_pickup(LocationPoint::new("Ikeja City Mall", 6.61, 3.35));
        Harness {
            controller,
            api,
            notifier,
            rooms,
            store,
        }
    }

    fn lekki() -> LocationPoint {
        LocationPoint::new("Lekki Phase 1", 6.44, 3.47)
    }

    fn driver() -> Driver {
        Driver {
            id: "drv-1".to_string(),
            name: "Musa".to_string(),
            vehicle: "Bajaj RE".to_string(),
            vehicle_number: "LND-204-KJ".to_string(),
            rating: 4.8,
            profile_picture: None,
            phone: "+2348031234567".to_string(),
            location: DriverLocation {
                latitude: 6.60,
                longitude: 3.34,
                heading: Some(180.0),
            },
        }
    }

    async fn book_to_search(h: &Harness) {
        h.controller.tap_where_to();
        h.controller.choose_destination(lekki()).await.unwrap();
        h.controller.confirm_booking().await.unwrap();
        assert_eq!(h.store.stage(), RideStage::Search);
    }

    async fn drive_to(h: &Harness, stage: RideStage) {
        book_to_search(h).await;
        h.controller
            .handle_event(RideEvent::Accepted { driver: driver() })
            .await;
        if stage == RideStage::Paired {
            return;
        }
        h.controller.handle_event(RideEvent::Arrived).await;
        if stage == RideStage::Arrived {
            return;
        }
        h.controller.handle_event(RideEvent::Started).await;
        assert_eq!(h.store.stage(), RideStage::Trip);
    }

    #[tokio::test]
    async fn test_happy_path_transitions() {
        let h = harness();
        assert_eq!(h.store.stage(), RideStage::Initial);

        h.controller.tap_where_to();
        assert_eq!(h.store.stage(), RideStage::Input);
        assert!(h.notifier.contains(&Effect::OpenDestinationSelector));

        h.controller.choose_destination(lekki()).await.unwrap();
        assert_eq!(h.store.stage(), RideStage::Confirm);

        h.controller.confirm_booking().await.unwrap();
        assert_eq!(h.store.stage(), RideStage::Search);
        assert_eq!(h.store.snapshot().ride_id.as_deref(), Some("r1"));
        assert_eq!(h.rooms.announced.lock().unwrap().as_slice(), &["r1"]);

        h.controller
            .handle_event(RideEvent::Accepted { driver: driver() })
            .await;
        assert_eq!(h.store.stage(), RideStage::Paired);
        assert!(h.store.snapshot().driver.is_some());

        h.controller.handle_event(RideEvent::Arrived).await;
        assert_eq!(h.store.stage(), RideStage::Arrived);

        h.controller.handle_event(RideEvent::Started).await;
        assert_eq!(h.store.stage(), RideStage::Trip);

        h.controller.handle_event(RideEvent::Completed).await;
        assert_eq!(h.store.stage(), RideStage::Initial);
        assert!(h.notifier.contains(&Effect::NavigateToRating {
            ride_id: "r1".to_string()
        }));
        assert!(h.store.snapshot().ride_id.is_none());
    }

    #[tokio::test]
    async fn test_recent_destination_skips_input() {
        let h = harness();
        // Recent pick with full coordinates goes straight to confirm.
        h.controller.choose_destination(lekki()).await.unwrap();
        assert_eq!(h.store.stage(), RideStage::Confirm);
    }

    #[tokio::test]
    async fn test_invalid_destination_stays_in_input() {
        let h = harness();
        h.controller.tap_where_to();
        let invalid = LocationPoint {
            address: "Somewhere".to_string(),
            coords: Default::default(),
        };
        assert!(h.controller.choose_destination(invalid).await.is_err());
        assert_eq!(h.store.stage(), RideStage::Input);
    }

    #[tokio::test]
    async fn test_back_out_clears_destination() {
        let h = harness();
        h.controller.tap_where_to();
        h.controller.choose_destination(lekki()).await.unwrap();

        h.controller.back_out();
        assert_eq!(h.store.stage(), RideStage::Input);
        // Destination kept while still picking.
        assert!(h.store.snapshot().destination.is_valid());

        h.controller.back_out();
        assert_eq!(h.store.stage(), RideStage::Initial);
        assert!(!h.store.snapshot().destination.is_valid());
    }

    #[tokio::test]
    async fn test_booking_failure_keeps_confirm_stage() {
        let h = harness();
        h.controller.tap_where_to();
        h.controller.choose_destination(lekki()).await.unwrap();

        h.api.fail_next.store(true, Ordering::SeqCst);
        assert!(h.controller.confirm_booking().await.is_err());
        assert_eq!(h.store.stage(), RideStage::Confirm);
        assert!(h.store.snapshot().ride_id.is_none());
        assert!(h
            .notifier
            .take()
            .iter()
            .any(|e| matches!(e, Effect::RetryableError(_))));
    }

    #[tokio::test]
    async fn test_cancel_blocked_during_trip() {
        let h = harness();
        drive_to(&h, RideStage::Trip).await;

        let before = h.store.snapshot();
        let result = h.controller.cancel_ride(None).await;
        assert!(matches!(result, Err(KekeError::CancelBlocked)));
        let after = h.store.snapshot();
        assert_eq!(after.stage, RideStage::Trip);
        assert_eq!(after.ride_id, before.ride_id);
        assert!(h.notifier.take().iter().any(|e| matches!(e, Effect::Blocked(_))));
        assert_eq!(h.api.cancels.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_cancel_during_search_resets() {
        let h = harness();
        book_to_search(&h).await;

        h.controller.cancel_ride(Some("changed my mind")).await.unwrap();
        let state = h.store.snapshot();
        assert_eq!(state.stage, RideStage::Initial);
        assert!(state.ride_id.is_none());
        assert!(state.driver.is_none());
        assert!(state.messages.is_empty());
    }

    #[tokio::test]
    async fn test_cancel_failure_keeps_stage() {
        let h = harness();
        book_to_search(&h).await;

        h.api.fail_next.store(true, Ordering::SeqCst);
        assert!(h.controller.cancel_ride(None).await.is_err());
        assert_eq!(h.store.stage(), RideStage::Search);
        assert!(h.store.snapshot().ride_id.is_some());
    }

    #[tokio::test]
    async fn test_accepted_after_local_cancel_is_ignored() {
        let h = harness();
        book_to_search(&h).await;
        h.controller.cancel_ride(None).await.unwrap();

        // The racing acceptance lands after the ride id is gone.
        h.controller
            .handle_event(RideEvent::Accepted { driver: driver() })
            .await;
        assert_eq!(h.store.stage(), RideStage::Initial);
        assert!(h.store.snapshot().driver.is_none());
    }

    #[tokio::test]
    async fn test_terminal_events_are_idempotent() {
        let h = harness();
        drive_to(&h, RideStage::Trip).await;

        h.controller.handle_event(RideEvent::Completed).await;
        let once = h.store.snapshot();
        let rating_navs = h
            .notifier
            .take()
            .into_iter()
            .filter(|e| matches!(e, Effect::NavigateToRating { .. }))
            .count();
        assert_eq!(rating_navs, 1);

        h.controller.handle_event(RideEvent::Completed).await;
        assert_eq!(h.store.snapshot(), once);
        // No second navigation.
        assert!(!h
            .notifier
            .take()
            .iter()
            .any(|e| matches!(e, Effect::NavigateToRating { .. })));

        // Double cancel is equally harmless.
        h.controller
            .handle_event(RideEvent::Cancelled { reason: None })
            .await;
        assert_eq!(h.store.snapshot(), once);
    }

    #[tokio::test]
    async fn test_server_cancel_resets_from_any_active_stage() {
        let h = harness();
        drive_to(&h, RideStage::Paired).await;

        h.controller
            .handle_event(RideEvent::Cancelled {
                reason: Some("Driver had a breakdown".to_string()),
            })
            .await;
        assert_eq!(h.store.stage(), RideStage::Initial);
        assert!(h
            .notifier
            .contains(&Effect::Toast("Driver had a breakdown".to_string())));
    }

    #[tokio::test]
    async fn test_chat_round_trip_restores_origin() {
        let h = harness();
        drive_to(&h, RideStage::Arrived).await;

        h.controller.open_chat();
        assert_eq!(h.store.stage(), RideStage::Chat);
        h.controller.close_chat();
        assert_eq!(h.store.stage(), RideStage::Arrived);

        // Chat is not reachable outside the active driver stages.
        h.controller
            .handle_event(RideEvent::Cancelled { reason: None })
            .await;
        h.controller.open_chat();
        assert_eq!(h.store.stage(), RideStage::Initial);
    }

    #[tokio::test]
    async fn test_arrival_and_start_survive_open_chat() {
        let h = harness();
        drive_to(&h, RideStage::Paired).await;

        h.controller.open_chat();
        h.controller.handle_event(RideEvent::Arrived).await;
        h.controller.handle_event(RideEvent::Started).await;
        // The overlay stays up while the ride advances underneath it.
        assert_eq!(h.store.stage(), RideStage::Chat);
        assert!(h
            .notifier
            .contains(&Effect::Toast("Your Keke has arrived".to_string())));

        h.controller.close_chat();
        assert_eq!(h.store.stage(), RideStage::Trip);
    }

    #[tokio::test]
    async fn test_completion_during_chat_reaches_rating() {
        let h = harness();
        drive_to(&h, RideStage::Paired).await;

        h.controller.open_chat();
        h.controller.handle_event(RideEvent::Arrived).await;
        h.controller.handle_event(RideEvent::Started).await;
        h.controller.handle_event(RideEvent::Completed).await;

        assert_eq!(h.store.stage(), RideStage::Initial);
        assert!(h.notifier.contains(&Effect::NavigateToRating {
            ride_id: "r1".to_string()
        }));
    }

    #[tokio::test]
    async fn test_chat_return_inference_without_recorded_origin() {
        let state = RideState {
            driver: Some(driver()),
            eta_minutes: Some(7),
            ..Default::default()
        };
        assert_eq!(chat_return_stage(&state), RideStage::Trip);

        let state = RideState {
            driver: Some(driver()),
            eta_minutes: None,
            ..Default::default()
        };
        assert_eq!(chat_return_stage(&state), RideStage::Arrived);

        let state = RideState::default();
        assert_eq!(chat_return_stage(&state), RideStage::Paired);
    }

    #[tokio::test]
    async fn test_route_update_respects_current_concern() {
        let h = harness();
        drive_to(&h, RideStage::Paired).await;

        let pickup_route = RouteDirections {
            coordinates: vec![GeoPoint::new(6.60, 3.34), GeoPoint::new(6.61, 3.35)],
            distance: 1.2,
            duration: 6.0,
        };
        h.controller
            .handle_event(RideEvent::RouteUpdated {
                route_type: RouteKind::Pickup,
                directions: pickup_route,
            })
            .await;
        assert_eq!(h.store.snapshot().eta_minutes, Some(6));

        // A destination-route update while still paired must not clobber
        // the approach ETA.
        let trip_route = RouteDirections {
            coordinates: vec![GeoPoint::new(6.61, 3.35), GeoPoint::new(6.44, 3.47)],
            distance: 18.0,
            duration: 45.0,
        };
        h.controller
            .handle_event(RideEvent::RouteUpdated {
                route_type: RouteKind::Destination,
                directions: trip_route.clone(),
            })
            .await;
        let state = h.store.snapshot();
        assert_eq!(state.eta_minutes, Some(6));
        assert_eq!(state.destination_route, Some(trip_route));
    }

    #[tokio::test]
    async fn test_driver_location_update_never_changes_stage() {
        let h = harness();
        drive_to(&h, RideStage::Paired).await;

        h.controller
            .handle_event(RideEvent::DriverLocation {
                location: DriverLocation {
                    latitude: 6.605,
                    longitude: 3.345,
                    heading: Some(90.0),
                },
            })
            .await;
        let state = h.store.snapshot();
        assert_eq!(state.stage, RideStage::Paired);
        assert_eq!(state.driver.unwrap().location.latitude, 6.605);
    }

    #[tokio::test]
    async fn test_expiry_guard_respects_completion_seen() {
        let mut state = RideState {
            stage: RideStage::Trip,
            ..Default::default()
        };
        assert!(should_force_expire(&state));

        state.completion_seen = true;
        assert!(!should_force_expire(&state));

        let idle = RideState::default();
        assert!(!should_force_expire(&idle));
    }

    #[tokio::test]
    async fn test_expiry_guard_only_fires_during_trip() {
        // A pickup ETA running out while the driver is stuck in traffic
        // must not throw away the matched ride.
        let state = RideState {
            stage: RideStage::Paired,
            ..Default::default()
        };
        assert!(!should_force_expire(&state));

        let state = RideState {
            stage: RideStage::Arrived,
            ..Default::default()
        };
        assert!(!should_force_expire(&state));

        // The chat overlay is transparent to the guard.
        let state = RideState {
            stage: RideStage::Chat,
            chat_return_stage: Some(RideStage::Trip),
            ..Default::default()
        };
        assert!(should_force_expire(&state));

        let state = RideState {
            stage: RideStage::Chat,
            chat_return_stage: Some(RideStage::Arrived),
            ..Default::default()
        };
        assert!(!should_force_expire(&state));
    }

    #[tokio::test]
    async fn test_route_update_after_reset_is_dropped() {
        let h = harness();
        book_to_search(&h).await;
        h.controller.cancel_ride(None).await.unwrap();

        h.controller
            .handle_event(RideEvent::RouteUpdated {
                route_type: RouteKind::Pickup,
                directions: RouteDirections {
                    coordinates: vec![],
                    distance: 1.0,
                    duration: 5.0,
                },
            })
            .await;
        let state = h.store.snapshot();
        assert_eq!(state.stage, RideStage::Initial);
        assert!(state.pickup_route.is_none());
        assert!(state.eta_minutes.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_eta_countdown_resumes_after_reaching_zero() {
        let mut config = AppConfig::default();
        config.completion_grace = Duration::from_secs(1);
        let h = harness_with(config);
        drive_to(&h, RideStage::Paired).await;

        h.controller
            .handle_event(RideEvent::RouteUpdated {
                route_type: RouteKind::Pickup,
                directions: RouteDirections {
                    coordinates: vec![],
                    distance: 0.4,
                    duration: 1.0,
                },
            })
            .await;

        tokio::time::sleep(Duration::from_secs(65)).await;
        let state = h.store.snapshot();
        assert_eq!(state.eta_minutes, Some(0));
        // Pickup countdown at zero is not a trip expiry.
        assert_eq!(state.stage, RideStage::Paired);

        // Driver moving again: the server restores the ETA and the local
        // countdown picks it back up.
        h.controller
            .handle_event(RideEvent::RouteUpdated {
                route_type: RouteKind::Pickup,
                directions: RouteDirections {
                    coordinates: vec![],
                    distance: 1.2,
                    duration: 3.0,
                },
            })
            .await;
        tokio::time::sleep(Duration::from_secs(61)).await;
        assert_eq!(h.store.snapshot().eta_minutes, Some(2));
        assert_eq!(h.store.stage(), RideStage::Paired);
    }

    #[tokio::test]
    async fn test_reconnect_applies_terminal_status() {
        let h = harness();
        drive_to(&h, RideStage::Paired).await;

        *h.api.ride_status_override.lock().unwrap() = Some("cancelled".to_string());
        h.controller.reconcile_after_reconnect().await;
        assert_eq!(h.store.stage(), RideStage::Initial);
        assert!(h.store.snapshot().ride_id.is_none());
        assert!(h
            .notifier
            .contains(&Effect::Toast("Your ride was cancelled".to_string())));
    }

    #[tokio::test]
    async fn test_reconnect_keeps_live_ride_untouched() {
        let h = harness();
        book_to_search(&h).await;

        h.controller.reconcile_after_reconnect().await;
        assert_eq!(h.store.stage(), RideStage::Search);
        assert!(h.store.snapshot().ride_id.is_some());

        // Idle sessions skip the status check entirely.
        h.controller.cancel_ride(None).await.unwrap();
        h.controller.reconcile_after_reconnect().await;
        assert_eq!(h.store.stage(), RideStage::Initial);
    }

    #[tokio::test]
    async fn test_rating_failure_is_retryable() {
        let h = harness();
        h.api.fail_next.store(true, Ordering::SeqCst);
        let rating = RideRating {
            ride_id: "r1".to_string(),
            stars: 5,
            comment: None,
        };
        assert!(h.controller.submit_rating(rating).await.is_err());
        assert!(h
            .notifier
            .take()
            .iter()
            .any(|e| matches!(e, Effect::RetryableError(_))));
        assert_eq!(h.api.rating_submissions.load(Ordering::SeqCst), 1);
    }
}
