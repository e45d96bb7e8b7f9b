//! Enrolment notifications for the student, the course teacher and admins.

use std::sync::Arc;

use askama::Template;

use crate::config::MailConfig;
use crate::error::CallbackError;
use crate::models::User;
use crate::ports::EnrolmentHost;
use crate::services::enrolment::Finalized;
use crate::services::mailer::{EmailMessage, MailError, Mailer};

/// Values substituted into templates for one recipient.
#[derive(Debug, Clone)]
pub struct TemplateVars {
    pub course_full_name: String,
    pub course_short_name: String,
    pub amount: String,
    pub student_name: String,
    pub teacher_name: String,
    pub admin_username: String,
}

impl TemplateVars {
    /// Placeholder table for custom HTML overrides.
    pub fn placeholders(&self) -> [(&'static str, &str); 6] {
        [
            ("$courseFullName", &self.course_full_name),
            ("$courseShortName", &self.course_short_name),
            ("$amount", &self.amount),
            ("$studentUsername", &self.student_name),
            ("$teacherName", &self.teacher_name),
            ("$adminUsername", &self.admin_username),
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Audience {
    Student,
    Teacher,
    Admin,
}

/// Counts of messages handed to the mailer.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub sent: usize,
    pub failed: usize,
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    host: Arc<dyn EnrolmentHost>,
    mailer: Arc<dyn Mailer>,
    config: MailConfig,
}

impl NotificationDispatcher {
    pub fn new(host: Arc<dyn EnrolmentHost>, mailer: Arc<dyn Mailer>, config: MailConfig) -> Self {
        Self {
            host,
            mailer,
            config,
        }
    }

    /// Send the configured enrolment emails.
    ///
    /// Lookup failures abort; individual send failures are logged and
    /// counted because the payment record is already settled by now.
    pub async fn dispatch(&self, finalized: &Finalized) -> Result<DispatchReport, CallbackError> {
        let mut report = DispatchReport::default();
        let course = &finalized.course;
        let student = &finalized.user;

        let teacher = self.host.course_teacher(course.id).await?;
        let admins = if self.config.mail_admins {
            self.host.site_admins().await?
        } else {
            Vec::new()
        };

        let subject = format!("New enrolment in {}", course.short_name);
        let mut vars = TemplateVars {
            course_full_name: course.full_name.clone(),
            course_short_name: course.short_name.clone(),
            amount: format_amount(finalized),
            student_name: student.full_name(),
            teacher_name: teacher
                .as_ref()
                .map(|t| t.username.clone())
                .unwrap_or_else(|| self.config.support_name.clone()),
            admin_username: admins
                .first()
                .map(|a| a.username.clone())
                .unwrap_or_default(),
        };

        if self.config.mail_students {
            let (from_name, reply_to) = match &teacher {
                Some(t) => (t.full_name(), t.email.clone()),
                None => (
                    self.config.support_name.clone(),
                    self.config.support_email.clone(),
                ),
            };
            let email = self
                .render(Audience::Student, &vars)
                .map(|body_html| EmailMessage {
                    to: student.email.clone(),
                    to_name: student.full_name(),
                    subject: subject.clone(),
                    body_html,
                    body_text: None,
                    from_name: Some(from_name),
                    reply_to: Some(reply_to),
                });
            self.deliver(&student.email, email, &mut report).await;
        }

        if self.config.mail_teachers {
            if let Some(teacher) = &teacher {
                let email = self.from_student(teacher, student, &subject, Audience::Teacher, &vars);
                self.deliver(&teacher.email, email, &mut report).await;
            }
        }

        for admin in &admins {
            vars.admin_username = admin.username.clone();
            let email = self.from_student(admin, student, &subject, Audience::Admin, &vars);
            self.deliver(&admin.email, email, &mut report).await;
        }

        tracing::info!(
            order = %finalized.order,
            sent = report.sent,
            failed = report.failed,
            "Enrolment notifications dispatched"
        );

        Ok(report)
    }

    fn from_student(
        &self,
        recipient: &User,
        student: &User,
        subject: &str,
        audience: Audience,
        vars: &TemplateVars,
    ) -> Result<EmailMessage, MailError> {
        Ok(EmailMessage {
            to: recipient.email.clone(),
            to_name: recipient.full_name(),
            subject: subject.to_string(),
            body_html: self.render(audience, vars)?,
            body_text: None,
            from_name: Some(student.full_name()),
            reply_to: Some(student.email.clone()),
        })
    }

    async fn deliver(
        &self,
        to: &str,
        email: Result<EmailMessage, MailError>,
        report: &mut DispatchReport,
    ) {
        let result = match email {
            Ok(email) => self.mailer.send(&email).await,
            Err(e) => Err(e),
        };

        match result {
            Ok(()) => report.sent += 1,
            Err(e) => {
                report.failed += 1;
                tracing::warn!(to = %to, error = %e, "Failed to send enrolment email");
            }
        }
    }

    /// Custom override if one is configured, the built-in template otherwise.
    pub fn render(&self, audience: Audience, vars: &TemplateVars) -> Result<String, MailError> {
        let custom = match audience {
            Audience::Student => self.config.student_email.as_deref(),
            Audience::Teacher => self.config.teacher_email.as_deref(),
            Audience::Admin => self.config.admin_email.as_deref(),
        };

        match custom {
            Some(template) => Ok(substitute(
                &decode_html_entities(template),
                &vars.placeholders(),
            )),
            None => Ok(default_template(audience, vars)?),
        }
    }
}

fn format_amount(finalized: &Finalized) -> String {
    let amount = finalized.record.amount.or(finalized.instance.cost);
    let currency = finalized
        .record
        .currency
        .as_deref()
        .or(finalized.instance.currency.as_deref())
        .unwrap_or("IDR");

    match amount {
        Some(a) if a.fract() == 0.0 => format!("{} {:.0}", currency, a),
        Some(a) => format!("{} {:.2}", currency, a),
        None => String::new(),
    }
}

/// Replace placeholders in one left-to-right pass, preferring the longest
/// key at each position. Substituted text is never rescanned.
pub fn substitute(template: &str, pairs: &[(&str, &str)]) -> String {
    let mut keys: Vec<&(&str, &str)> = pairs.iter().filter(|(k, _)| !k.is_empty()).collect();
    keys.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    'scan: while !rest.is_empty() {
        for (key, value) in &keys {
            if let Some(tail) = rest.strip_prefix(key) {
                out.push_str(value);
                rest = tail;
                continue 'scan;
            }
        }

        let mut chars = rest.chars();
        if let Some(c) = chars.next() {
            out.push(c);
        }
        rest = chars.as_str();
    }

    out
}

/// Decode every named and numeric entity an HTML editor may have stored.
pub fn decode_html_entities(input: &str) -> String {
    html_escape::decode_html_entities(input).into_owned()
}

#[derive(Template)]
#[template(path = "mail_student.html")]
struct StudentMail<'a> {
    vars: &'a TemplateVars,
}

#[derive(Template)]
#[template(path = "mail_teacher.html")]
struct TeacherMail<'a> {
    vars: &'a TemplateVars,
}

#[derive(Template)]
#[template(path = "mail_admin.html")]
struct AdminMail<'a> {
    vars: &'a TemplateVars,
}

fn default_template(audience: Audience, vars: &TemplateVars) -> askama::Result<String> {
    match audience {
        Audience::Student => StudentMail { vars }.render(),
        Audience::Teacher => TeacherMail { vars }.render(),
        Audience::Admin => AdminMail { vars }.render(),
    }
}
