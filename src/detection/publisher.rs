//! Hand-off from the detection loop to its consumers.

use crate::filters::SmoothingState;
use crate::landmark::NormalizedPoint;
use tokio::sync::watch;

/// Receives the outcome of every completed detection cycle
pub trait TrackingConsumer {
    /// Filtered tracked point, or `None` when no face was found
    fn on_update(&mut self, point: Option<SmoothingState>);

    /// Full landmark set of the tracked face, empty when no face was found
    fn on_landmarks(&mut self, _landmarks: &[NormalizedPoint]) {}
}

impl<F> TrackingConsumer for F
where
    F: FnMut(Option<SmoothingState>),
{
    fn on_update(&mut self, point: Option<SmoothingState>) {
        self(point);
    }
}

/// Publishes the latest pose and overlay landmarks through watch channels.
///
/// A `None` update keeps the previously published pose so the camera holds
/// still while the face is briefly lost. Readers always see a whole value.
pub struct PosePublisher {
    pose: watch::Sender<Option<SmoothingState>>,
    overlay: watch::Sender<Vec<NormalizedPoint>>,
}

/// Reader side of a [`PosePublisher`]
#[derive(Clone)]
pub struct PoseSubscription {
    pub pose: watch::Receiver<Option<SmoothingState>>,
    pub overlay: watch::Receiver<Vec<NormalizedPoint>>,
}

impl PosePublisher {
    pub fn channel() -> (Self, PoseSubscription) {
        let (pose_tx, pose_rx) = watch::channel(None);
        let (overlay_tx, overlay_rx) = watch::channel(Vec::new());
        (
            Self {
                pose: pose_tx,
                overlay: overlay_tx,
            },
            PoseSubscription {
                pose: pose_rx,
                overlay: overlay_rx,
            },
        )
    }

    /// Latest published pose
    pub fn latest(&self) -> Option<SmoothingState> {
        *self.pose.borrow()
    }
}

impl TrackingConsumer for PosePublisher {
    fn on_update(&mut self, point: Option<SmoothingState>) {
        if let Some(point) = point {
            self.pose.send_replace(Some(point));
        }
    }

    fn on_landmarks(&mut self, landmarks: &[NormalizedPoint]) {
        self.overlay.send_modify(|overlay| {
            overlay.clear();
            overlay.extend_from_slice(landmarks);
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_none_holds_last_pose() {
        let (mut publisher, subscription) = PosePublisher::channel();
        assert_eq!(*subscription.pose.borrow(), None);

        let p1 = SmoothingState::new(0.1, 0.2, 3.0);
        publisher.on_update(Some(p1));
        publisher.on_update(None);
        publisher.on_update(None);
        assert_eq!(*subscription.pose.borrow(), Some(p1));
        assert_eq!(publisher.latest(), Some(p1));
    }

    #[test]
    fn test_overlay_is_replaced() {
        let (mut publisher, subscription) = PosePublisher::channel();
        publisher.on_landmarks(&[NormalizedPoint::new(0.1, 0.1, 0.0); 3]);
        assert_eq!(subscription.overlay.borrow().len(), 3);
        publisher.on_landmarks(&[]);
        assert!(subscription.overlay.borrow().is_empty());
    }

    #[test]
    fn test_closure_consumer() {
        let mut seen = Vec::new();
        {
            let mut consumer = |point: Option<SmoothingState>| seen.push(point);
            consumer.on_update(None);
            consumer.on_landmarks(&[]);
        }
        assert_eq!(seen, vec![None]);
    }
}
