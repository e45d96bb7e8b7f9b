pub mod enrolment;
pub mod ipaymu;
pub mod mailer;
pub mod memory;
pub mod metrics;
pub mod notification;
pub mod repository;

pub use enrolment::{EnrolmentFinalizer, Finalized};
pub use ipaymu::IpaymuClient;
pub use mailer::{LogMailer, Mailer, RecordingMailer, SmtpMailer};
pub use memory::InMemoryLms;
pub use metrics::{get_metrics, init_metrics, record_callback};
pub use notification::NotificationDispatcher;
pub use repository::EnrolmentRepository;
